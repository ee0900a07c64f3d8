//! Streamed invocation: relays Driver output to the observer as it arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use factory_core::StreamEvent;
use factory_process::{OutputChunk, ProcessError, ProcessHandle, ProcessRunner};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::invocation::BatchInvocation;

/// Message of the `error` event emitted when an invocation task dies.
pub const ORCHESTRATOR_FAULT: &str = "internal orchestrator fault";

/// Message of the `error` event that ends a stream cut short by shutdown.
pub const SHUTDOWN_MESSAGE: &str = "server shutting down";

/// Write side of an observer's event stream.
///
/// Once a terminal event was sent, or the observer went away, every further
/// emit is a silent no-op. Clones made with [`EventSink::fault_reporter`]
/// share that state.
#[derive(Debug)]
pub struct EventSink {
    tx: Option<mpsc::Sender<StreamEvent>>,
    finished: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            tx: Some(tx),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Second handle on the same stream, used to report a crashed invocation.
    pub fn fault_reporter(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            finished: self.finished.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some() && !self.finished.load(Ordering::Acquire)
    }

    /// True once a terminal event has been delivered.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Send `event`. Returns false if the sink is closed or the observer
    /// disconnected, in which case the sink closes itself.
    pub async fn emit(&mut self, event: StreamEvent) -> bool {
        if !self.is_open() {
            return false;
        }
        let Some(tx) = &self.tx else {
            return false;
        };

        let terminal = event.is_terminal();
        let kind = event.kind();
        if tx.send(event).await.is_err() {
            debug!(event = kind, "Observer gone, closing sink");
            self.close();
            return false;
        }

        if terminal {
            self.finished.store(true, Ordering::Release);
            self.close();
        }
        true
    }

    /// Stop writing. Idempotent.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Resolves when the observer has gone away, or at once if the sink is
    /// already closed.
    pub async fn closed(&self) {
        if let Some(tx) = &self.tx {
            tx.closed().await;
        }
    }
}

/// How a running invocation gets stopped from outside.
pub(super) struct Stop {
    pub shutdown: CancellationToken,
    /// Time between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
}

/// Run `invocation` on its own task under a supervisor.
///
/// If the task dies before sending a terminal event, the supervisor sends a
/// single `error` event in its place. The supervisor is registered with
/// `tracker` so shutdown can wait for it.
pub(super) fn launch(
    tracker: &TaskTracker,
    runner: Arc<dyn ProcessRunner>,
    invocation: BatchInvocation,
    sink: EventSink,
    stop: Stop,
) {
    let id = invocation.id().clone();
    let mut reporter = sink.fault_reporter();
    let task = tokio::spawn(drive(runner, invocation, sink, stop));

    tracker.spawn(async move {
        if let Err(e) = task.await {
            error!(invocation_id = %id, error = %e, "Invocation task failed");
            if !reporter.is_finished() {
                reporter
                    .emit(StreamEvent::Error {
                        message: ORCHESTRATOR_FAULT.to_string(),
                    })
                    .await;
            }
        }
    });
}

enum Step {
    Chunk(OutputChunk),
    Drained,
    Exited(Result<i32, ProcessError>),
    Disconnected,
    Shutdown,
}

async fn drive(
    runner: Arc<dyn ProcessRunner>,
    mut invocation: BatchInvocation,
    mut sink: EventSink,
    stop: Stop,
) {
    info!(
        invocation_id = %invocation.id(),
        work_root = %invocation.work_root_display(),
        "Starting streamed batch"
    );

    if !sink.emit(invocation.start_event()).await {
        invocation.abort();
        info!(invocation_id = %invocation.id(), "Observer gone before start, not spawning");
        return;
    }

    if stop.shutdown.is_cancelled() {
        let event = invocation.fail(SHUTDOWN_MESSAGE);
        sink.emit(event).await;
        return;
    }

    let mut handle = match runner.spawn(invocation.command()).await {
        Ok(handle) => handle,
        Err(e) => {
            error!(invocation_id = %invocation.id(), error = %e, "Failed to spawn driver");
            let event = invocation.fail(e.to_string());
            sink.emit(event).await;
            return;
        }
    };
    invocation.mark_running();

    let step = loop {
        let step = tokio::select! {
            _ = sink.closed() => Step::Disconnected,
            _ = stop.shutdown.cancelled() => Step::Shutdown,
            chunk = handle.next_chunk() => match chunk {
                Some(chunk) => Step::Chunk(chunk),
                None => Step::Drained,
            },
        };

        match step {
            Step::Chunk(chunk) => {
                let event = invocation.record(chunk);
                // A stalled observer must not hold up shutdown.
                let sent = tokio::select! {
                    sent = sink.emit(event) => Some(sent),
                    _ = stop.shutdown.cancelled() => None,
                };
                match sent {
                    Some(true) => {}
                    Some(false) => break Step::Disconnected,
                    None => break Step::Shutdown,
                }
            }
            Step::Drained => {
                break tokio::select! {
                    _ = sink.closed() => Step::Disconnected,
                    _ = stop.shutdown.cancelled() => Step::Shutdown,
                    status = handle.wait() => Step::Exited(status),
                };
            }
            other => break other,
        }
    };

    match step {
        Step::Exited(Ok(exit_code)) => {
            let result = invocation.finish(exit_code);
            info!(
                invocation_id = %invocation.id(),
                exit_code,
                total = result.summary.total,
                success = result.summary.success,
                failed = result.summary.failed,
                "Streamed batch finished"
            );
            sink.emit(StreamEvent::End(result)).await;
        }
        Step::Exited(Err(e)) => {
            error!(invocation_id = %invocation.id(), error = %e, "Failed to wait for driver");
            let event = invocation.fail(e.to_string());
            sink.emit(event).await;
        }
        Step::Shutdown => shut_down(&mut invocation, &mut handle, &mut sink, stop.kill_grace).await,
        _ => abort(&mut invocation, &mut handle, &mut sink, stop.kill_grace).await,
    }
}

/// Observer disconnected: stop writing and bring the Driver down.
async fn abort(
    invocation: &mut BatchInvocation,
    handle: &mut ProcessHandle,
    sink: &mut EventSink,
    kill_grace: Duration,
) {
    sink.close();
    invocation.abort();
    warn!(
        invocation_id = %invocation.id(),
        pid = ?handle.pid(),
        "Observer disconnected, terminating driver"
    );

    let exit_code = handle.terminate(kill_grace).await;
    info!(invocation_id = %invocation.id(), exit_code = ?exit_code, "Driver terminated");
}

/// Server is stopping: bring the Driver down, then tell the observer.
async fn shut_down(
    invocation: &mut BatchInvocation,
    handle: &mut ProcessHandle,
    sink: &mut EventSink,
    kill_grace: Duration,
) {
    warn!(
        invocation_id = %invocation.id(),
        pid = ?handle.pid(),
        "Server shutting down, terminating driver"
    );
    let exit_code = handle.terminate(kill_grace).await;
    info!(invocation_id = %invocation.id(), exit_code = ?exit_code, "Driver terminated");

    let event = invocation.fail(SHUTDOWN_MESSAGE);
    if tokio::time::timeout(kill_grace, sink.emit(event)).await.is_err() {
        debug!(invocation_id = %invocation.id(), "Observer not reading, dropping final event");
    }
}
