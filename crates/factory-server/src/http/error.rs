//! Mapping of server errors to HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::credentials::CredentialError;
use crate::orchestrator::{BatchError, SHUTDOWN_MESSAGE};
use crate::requirements::DetectError;

use super::responses::ErrorResponse;

/// Every failure the API reports, as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    // Client errors (4xx)
    /// Body is not valid JSON or has the wrong shape.
    InvalidJson { message: String },
    /// Body parsed but failed validation.
    InvalidRequest { message: String },

    // Server errors (5xx)
    Internal { message: String },
    /// Server is shutting down.
    Unavailable { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidJson { message } | ApiError::InvalidRequest { message } => {
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
            ApiError::Unavailable { message } => (StatusCode::SERVICE_UNAVAILABLE, message),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection, "Invalid JSON in request body");
        ApiError::InvalidJson {
            message: rejection.body_text(),
        }
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::InvalidRequest(e) => ApiError::bad_request(e.to_string()),
            BatchError::Spawn(e) => ApiError::internal(e.to_string()),
            BatchError::ShuttingDown => ApiError::Unavailable {
                message: SHUTDOWN_MESSAGE.to_string(),
            },
        }
    }
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        ApiError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use factory_core::CoreError;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid: ApiError = BatchError::InvalidRequest(CoreError::InvalidRequest("bad".into())).into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let stopping: ApiError = BatchError::ShuttingDown.into();
        assert_eq!(stopping.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let failed: ApiError = DetectError::Failed("nope".into()).into();
        assert_eq!(
            failed.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
