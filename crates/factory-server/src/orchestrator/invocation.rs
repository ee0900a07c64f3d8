//! Per-run bookkeeping for a streamed Driver invocation.

use std::path::PathBuf;

use factory_core::{BatchResult, InvocationId, InvocationState, StreamEvent};
use factory_process::{CommandSpec, OutputChunk};
use tracing::debug;

use super::PreparedRun;

/// One streamed run of the Driver.
///
/// Owns the accumulated output so the final `end` event can carry the full
/// stdout/stderr and the parsed summary.
#[derive(Debug)]
pub struct BatchInvocation {
    id: InvocationId,
    work_root: PathBuf,
    command: CommandSpec,
    state: InvocationState,
    stdout: String,
    stderr: String,
}

impl BatchInvocation {
    pub fn new(run: PreparedRun) -> Self {
        Self {
            id: run.id,
            work_root: run.work_root,
            command: run.command,
            state: InvocationState::Starting,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn id(&self) -> &InvocationId {
        &self.id
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn work_root_display(&self) -> String {
        self.work_root.display().to_string()
    }

    /// The `start` event for this invocation.
    pub fn start_event(&self) -> StreamEvent {
        StreamEvent::Start {
            work_root: self.work_root_display(),
        }
    }

    pub fn mark_running(&mut self) {
        self.set_state(InvocationState::Running);
    }

    /// Append a chunk to its buffer and turn it into an event.
    pub fn record(&mut self, chunk: OutputChunk) -> StreamEvent {
        match chunk {
            OutputChunk::Stdout(data) => {
                self.stdout.push_str(&data);
                StreamEvent::Stdout { data }
            }
            OutputChunk::Stderr(data) => {
                self.stderr.push_str(&data);
                StreamEvent::Stderr { data }
            }
        }
    }

    /// Close out the invocation with the Driver's exit code.
    pub fn finish(&mut self, exit_code: i32) -> BatchResult {
        self.set_state(InvocationState::Ended);
        BatchResult::from_output(
            exit_code,
            std::mem::take(&mut self.stdout),
            std::mem::take(&mut self.stderr),
            self.work_root_display(),
        )
    }

    /// Close out the invocation with an error message (no `end`).
    pub fn fail(&mut self, message: impl Into<String>) -> StreamEvent {
        self.set_state(InvocationState::Ended);
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// The observer went away.
    pub fn abort(&mut self) {
        self.set_state(InvocationState::Aborted);
    }

    fn set_state(&mut self, next: InvocationState) {
        match self.state.transition(next) {
            Ok(state) => self.state = state,
            Err(e) => debug!(invocation_id = %self.id, error = %e, "Ignoring state change"),
        }
    }
}
