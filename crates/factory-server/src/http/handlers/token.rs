//! Deploy token handler.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::info;

use crate::http::error::ApiError;
use crate::http::responses::{OkResponse, TokenRequest};
use crate::state::AppState;

/// Store the deploy token.
pub async fn save_token(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(req) = body?;
    let token = req.token.as_deref().map(str::trim).unwrap_or_default();
    if token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }

    state.credentials.write_token(token).await?;
    info!("Deploy token updated");
    Ok(Json(OkResponse::ok()))
}
