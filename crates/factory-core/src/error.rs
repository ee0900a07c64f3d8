//! Core domain errors.

use thiserror::Error;

/// Core domain errors for Agent Factory.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or out-of-range batch request. Nothing is spawned.
    #[error("{0}")]
    InvalidRequest(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
