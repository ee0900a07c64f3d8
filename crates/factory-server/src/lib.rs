//! Agent Factory Batch Console Server
//!
//! Accepts batch requests over HTTP, runs the Driver script once per request
//! and reports the outcome either as one JSON body or as a live NDJSON
//! stream.

pub mod config;
pub mod credentials;
pub mod http;
pub mod orchestrator;
pub mod requirements;
pub mod state;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, CredentialBackend};
pub use orchestrator::{BatchError, BatchOrchestrator, OrchestratorConfig};
pub use state::AppState;
