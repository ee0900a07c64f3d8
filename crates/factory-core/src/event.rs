//! Events streamed to the observer of a batch invocation.

use serde::{Deserialize, Serialize};

use crate::summary::BatchSummary;

/// Final outcome of a Driver run.
///
/// This is the body of the buffered endpoint and the payload of the
/// streamed `end` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// True when the Driver exited with code 0.
    pub ok: bool,
    /// Real exit code, or 1 if the Driver was killed by a signal.
    pub exit_code: i32,
    /// Complete stdout of the Driver.
    pub stdout: String,
    /// Complete stderr of the Driver.
    pub stderr: String,
    /// Tally parsed from the last `SUMMARY` line of stdout.
    pub summary: BatchSummary,
    /// Directory the Driver was told to work in.
    pub work_root: String,
}

impl BatchResult {
    /// Build a result from the Driver's exit code and captured output.
    pub fn from_output(
        exit_code: i32,
        stdout: String,
        stderr: String,
        work_root: impl Into<String>,
    ) -> Self {
        let summary = crate::summary::parse_summary(&stdout);
        Self {
            ok: exit_code == 0,
            exit_code,
            stdout,
            stderr,
            summary,
            work_root: work_root.into(),
        }
    }
}

/// One line of the NDJSON stream.
///
/// Exactly one `Start` comes first and exactly one of `End`/`Error` comes
/// last. `Stdout`/`Stderr` data is relayed as it arrives, so a chunk may end
/// in the middle of a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stream opened; the Driver is about to be spawned.
    Start { work_root: String },
    /// Raw stdout chunk.
    Stdout { data: String },
    /// Raw stderr chunk.
    Stderr { data: String },
    /// The Driver could not be started (terminal).
    Error { message: String },
    /// The Driver exited (terminal).
    End(BatchResult),
}

impl StreamEvent {
    /// Returns true for the events that close a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End(_) | Self::Error { .. })
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stdout { .. } => "stdout",
            Self::Stderr { .. } => "stderr",
            Self::Error { .. } => "error",
            Self::End(_) => "end",
        }
    }
}
