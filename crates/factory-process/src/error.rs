//! Error types for the process runner.

use thiserror::Error;

/// Errors that can occur while running a child process.
///
/// A non-zero exit is not an error; it is reported through the exit code.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The child could not be created at all (missing executable, permissions).
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A piped stdio handle was not available after spawning.
    #[error("failed to capture {0} of child process")]
    Pipe(&'static str),

    /// Waiting for the child to exit failed.
    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
}
