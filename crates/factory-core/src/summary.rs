//! Final batch tally reported by the Driver.

use serde::{Deserialize, Serialize};

/// Marker that starts the Driver's aggregate result line.
pub const SUMMARY_MARKER: &str = "SUMMARY ";

/// Success/failure tally of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
}

/// Parse the authoritative summary out of the Driver's full stdout.
///
/// The last line starting with `SUMMARY ` wins; earlier ones are per-run or
/// retried sub-summaries. Missing keys, and values that are not a
/// non-negative whole number, default to 0. Text without any marker yields
/// the zero summary.
pub fn parse_summary(stdout: &str) -> BatchSummary {
    let Some(line) = stdout
        .lines()
        .rev()
        .find(|line| line.starts_with(SUMMARY_MARKER))
    else {
        return BatchSummary::default();
    };

    let mut summary = BatchSummary::default();
    for token in line[SUMMARY_MARKER.len()..].split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let value = parse_count(value);
        match key {
            "TOTAL" => summary.total = value,
            "SUCCESS" => summary.success = value,
            "FAILED" => summary.failed = value,
            _ => {}
        }
    }

    summary
}

/// `7`, `7.0` and `7e0` are all 7.
fn parse_count(value: &str) -> u64 {
    if let Ok(n) = value.parse::<u64>() {
        return n;
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => f as u64,
        _ => 0,
    }
}
