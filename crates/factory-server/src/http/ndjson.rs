//! Streaming NDJSON response body.

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use factory_core::{encode_line, StreamEvent};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Turn an event receiver into a chunked `application/x-ndjson` response.
///
/// Each event is flushed as its own line. When the client goes away the body
/// stream is dropped, which drops the receiver.
pub fn ndjson_response(rx: mpsc::Receiver<StreamEvent>) -> Response {
    let lines = ReceiverStream::new(rx).map(|event| encode_line(&event));

    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}
