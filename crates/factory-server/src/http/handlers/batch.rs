//! Batch run handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    Json,
};
use factory_core::{BatchResult, RunBatchBody};
use tracing::info;

use crate::http::error::ApiError;
use crate::http::ndjson::ndjson_response;
use crate::state::AppState;

/// Run the batch and answer once the Driver has exited.
pub async fn run_batch(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RunBatchBody>, JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Json(body) = body?;
    info!(count = ?body.count, "Received buffered batch request");

    let result = state.orchestrator.run_buffered(body).await?;
    Ok(Json(result))
}

/// Run the batch and stream its progress as NDJSON.
///
/// Validation failures are answered with 400 before any stream is opened.
pub async fn run_batch_stream(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RunBatchBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    info!(count = ?body.count, "Received streamed batch request");

    let rx = state.orchestrator.run_stream(body).await?;
    Ok(ndjson_response(rx))
}
