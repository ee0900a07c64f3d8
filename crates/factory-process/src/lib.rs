//! Process runner for Agent Factory
//!
//! This crate starts exactly one external command, captures its stdout and
//! stderr incrementally, and knows how to stop it again. It enforces no
//! policy: timeouts, retries and what the output means are the caller's
//! business.
//!
//! # Example
//!
//! ```rust,no_run
//! use factory_process::{CommandSpec, ProcessRunner, TokioProcessRunner};
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = TokioProcessRunner::new();
//!     let spec = CommandSpec::new("/bin/bash")
//!         .arg("run-agent-factory-batch.sh")
//!         .arg("3")
//!         .env("RUN_HEARTBEAT_SECONDS", "15");
//!
//!     let mut handle = runner.spawn(&spec).await?;
//!     while let Some(chunk) = handle.next_chunk().await {
//!         print!("{}", chunk.data());
//!     }
//!     let exit_code = handle.wait().await?;
//!     println!("exit code: {}", exit_code);
//!     Ok(())
//! }
//! ```

mod command;
mod error;
mod handle;
mod runner;
mod utf8;

pub use command::CommandSpec;
pub use error::ProcessError;
pub use handle::{OutputChunk, ProcessHandle, ProcessOutput, SIGNAL_EXIT_CODE};
pub use runner::{ProcessRunner, TokioProcessRunner};
