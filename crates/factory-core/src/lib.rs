//! Agent Factory Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Child processes
//! - HTTP
//! - Runtime specifics
//!
//! Everything the batch orchestrator, the HTTP surface and the CLI observer
//! agree on lives here.

pub mod error;
pub mod event;
pub mod ids;
pub mod ndjson;
pub mod request;
pub mod requirements;
pub mod status;
pub mod summary;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{BatchResult, StreamEvent};
pub use ids::InvocationId;
pub use ndjson::{encode_line, NdjsonDecoder};
pub use request::{RunBatchBody, RunRequest};
pub use requirements::{AuthSource, Provider, Requirements};
pub use status::InvocationState;
pub use summary::{parse_summary, BatchSummary};
