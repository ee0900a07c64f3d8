//! Batch run requests and their validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Smallest batch a user may request.
pub const MIN_COUNT: u32 = 1;
/// Largest batch a user may request.
pub const MAX_COUNT: u32 = 100;
/// Per-run timeout used when the request does not carry a usable one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;
pub const MIN_TIMEOUT_SECS: u64 = 60;
pub const MAX_TIMEOUT_SECS: u64 = 7200;

/// Raw JSON body of `POST /api/run-batch` and `POST /api/run-batch-stream`.
///
/// Loosely typed on purpose: `count` and `timeoutSeconds` arrive from a web
/// form and may be numbers or numeric strings. [`RunRequest::from_body`] does
/// the actual validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunBatchBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_template: Option<String>,

    #[serde(default, alias = "railwayToken", skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_root: Option<String>,

    #[serde(default, alias = "runTimeoutSeconds", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<Value>,
}

impl RunBatchBody {
    /// Body for `count` runs of `command_template`.
    pub fn new(count: u32, command_template: impl Into<String>) -> Self {
        Self {
            count: Some(Value::from(count)),
            command_template: Some(command_template.into()),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_work_root(mut self, work_root: impl Into<String>) -> Self {
        self.work_root = Some(work_root.into());
        self
    }

    pub fn with_timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = Some(Value::from(secs));
        self
    }
}

/// A validated batch request. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    count: u32,
    command_template: String,
    auth_token: Option<String>,
    work_root: Option<PathBuf>,
    timeout_seconds: u64,
}

impl RunRequest {
    /// Validate a raw body.
    ///
    /// Fails with [`CoreError::InvalidRequest`] when `count` is not an integer
    /// in `[1, 100]` or `commandTemplate` is blank. The timeout never fails:
    /// integers are clamped to `[60, 7200]`, anything else becomes 1800.
    pub fn from_body(body: RunBatchBody) -> Result<Self, CoreError> {
        let count = parse_integer(body.count.as_ref())
            .filter(|c| (MIN_COUNT as i64..=MAX_COUNT as i64).contains(c))
            .ok_or_else(|| {
                CoreError::InvalidRequest(format!(
                    "count must be an integer between {} and {}",
                    MIN_COUNT, MAX_COUNT
                ))
            })? as u32;

        let command_template = non_blank(body.command_template)
            .ok_or_else(|| CoreError::InvalidRequest("commandTemplate is required".to_string()))?;

        let timeout_seconds = parse_integer(body.timeout_seconds.as_ref())
            .map(|t| t.clamp(MIN_TIMEOUT_SECS as i64, MAX_TIMEOUT_SECS as i64) as u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            count,
            command_template,
            auth_token: non_blank(body.auth_token),
            work_root: non_blank(body.work_root).map(PathBuf::from),
            timeout_seconds,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn command_template(&self) -> &str {
        &self.command_template
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn work_root(&self) -> Option<&PathBuf> {
        self.work_root.as_ref()
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }
}

/// Accept JSON integers, integral floats and numeric strings.
fn parse_integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> RunBatchBody {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_request() {
        let req = RunRequest::from_body(body(json!({
            "count": 3,
            "commandTemplate": "  echo hi  ",
            "authToken": " tok ",
            "workRoot": "/tmp/runs",
            "timeoutSeconds": 600
        })))
        .unwrap();

        assert_eq!(req.count(), 3);
        assert_eq!(req.command_template(), "echo hi");
        assert_eq!(req.auth_token(), Some("tok"));
        assert_eq!(req.work_root(), Some(&PathBuf::from("/tmp/runs")));
        assert_eq!(req.timeout_seconds(), 600);
    }

    #[test]
    fn test_count_out_of_range_or_not_integer() {
        for count in [json!(0), json!(101), json!(-1), json!(2.5), json!("x"), json!(null), json!([1])] {
            let err = RunRequest::from_body(body(json!({
                "count": count,
                "commandTemplate": "x"
            })))
            .unwrap_err();
            assert!(matches!(err, CoreError::InvalidRequest(_)), "count {:?}", count);
        }

        assert!(RunRequest::from_body(body(json!({"commandTemplate": "x"}))).is_err());
    }

    #[test]
    fn test_count_boundaries_and_lenient_forms() {
        for (count, expected) in [(json!(1), 1), (json!(100), 100), (json!(4.0), 4), (json!("7"), 7)] {
            let req = RunRequest::from_body(body(json!({
                "count": count,
                "commandTemplate": "x"
            })))
            .unwrap();
            assert_eq!(req.count(), expected);
        }
    }

    #[test]
    fn test_blank_command_template() {
        for template in [json!(""), json!("   "), json!(null)] {
            let err = RunRequest::from_body(body(json!({
                "count": 1,
                "commandTemplate": template
            })))
            .unwrap_err();
            assert_eq!(err.to_string(), "commandTemplate is required");
        }
    }

    #[test]
    fn test_timeout_clamped_or_defaulted() {
        let cases = [
            (json!(10), 60),
            (json!(99999), 7200),
            (json!(120), 120),
            (json!(90.5), DEFAULT_TIMEOUT_SECS),
            (json!("soon"), DEFAULT_TIMEOUT_SECS),
            (json!(null), DEFAULT_TIMEOUT_SECS),
        ];
        for (timeout, expected) in cases {
            let req = RunRequest::from_body(body(json!({
                "count": 1,
                "commandTemplate": "x",
                "timeoutSeconds": timeout
            })))
            .unwrap();
            assert_eq!(req.timeout_seconds(), expected);
        }
    }

    #[test]
    fn test_legacy_field_names() {
        let req = RunRequest::from_body(body(json!({
            "count": 2,
            "commandTemplate": "x",
            "railwayToken": "legacy",
            "runTimeoutSeconds": 300,
            "workRoot": null
        })))
        .unwrap();
        assert_eq!(req.auth_token(), Some("legacy"));
        assert_eq!(req.timeout_seconds(), 300);
        assert!(req.work_root().is_none());
    }

    #[test]
    fn test_builder_round_trips_through_json() {
        let built = RunBatchBody::new(5, "make agent")
            .with_auth_token("t")
            .with_work_root("/w")
            .with_timeout_seconds(900);
        let parsed = body(serde_json::to_value(&built).unwrap());
        let req = RunRequest::from_body(parsed).unwrap();
        assert_eq!(req.count(), 5);
        assert_eq!(req.timeout_seconds(), 900);
    }
}
