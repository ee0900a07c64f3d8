//! Client for the Agent Factory batch console.
//!
//! Wraps the HTTP API, including the NDJSON run stream, for use by the CLI
//! and by scripts that want to drive batches without a browser.

pub mod error;
pub mod http;

pub use error::ClientError;
pub use http::{EventStream, HttpClient};
