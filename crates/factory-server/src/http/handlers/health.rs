//! Health check and browser probe handlers.

use axum::{http::StatusCode, response::IntoResponse, Json};

use crate::http::responses::OkResponse;

/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(OkResponse::ok())
}

/// Chrome DevTools asks every localhost origin for this file.
pub async fn devtools_probe() -> impl IntoResponse {
    Json(OkResponse::ok())
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}
