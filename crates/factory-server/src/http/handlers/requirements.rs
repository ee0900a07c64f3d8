//! Requirement detection handler.

use std::sync::Arc;

use axum::{extract::State, Json};
use factory_core::Requirements;

use crate::http::error::ApiError;
use crate::state::AppState;

/// Report installed tools, deploy auth and the chosen agent provider.
pub async fn get_requirements(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Requirements>, ApiError> {
    let requirements = state.detector.detect().await?;
    Ok(Json(requirements))
}
