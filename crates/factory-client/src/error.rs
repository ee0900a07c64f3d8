//! Error types for the console client.

use thiserror::Error;

/// Errors that can occur when talking to the console server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or body error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    /// A stream line could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] factory_core::CoreError),
}
