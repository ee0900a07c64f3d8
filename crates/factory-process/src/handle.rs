//! Live handle to a spawned child process.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::utf8::Utf8Chunker;

/// Exit code reported when the child was killed by a signal or could not
/// report a code.
pub const SIGNAL_EXIT_CODE: i32 = 1;

/// Chunks buffered between the pipe readers and the consumer.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// A piece of child output, exactly as the OS delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

impl OutputChunk {
    /// The text of this chunk regardless of stream.
    pub fn data(&self) -> &str {
        match self {
            Self::Stdout(data) | Self::Stderr(data) => data,
        }
    }
}

/// Completed run of a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A running child with its output channels.
///
/// Dropping a handle whose child was never reaped SIGKILLs the child's whole
/// process group, so descendants holding the pipes open do not outlive it.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    output: mpsc::Receiver<OutputChunk>,
    /// Set once `wait` returned a status. Until then the pid, and with it
    /// the process group id, cannot be reused.
    reaped: bool,
}

impl ProcessHandle {
    /// Wrap a freshly spawned child and start draining its pipes.
    pub(crate) fn attach(mut child: Child) -> Result<Self, ProcessError> {
        let stdout = child.stdout.take().ok_or(ProcessError::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ProcessError::Pipe("stderr"))?;
        let pid = child.id();

        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        spawn_reader(stdout, OutputChunk::Stdout, tx.clone());
        spawn_reader(stderr, OutputChunk::Stderr, tx);

        Ok(Self {
            child,
            pid,
            output: rx,
            reaped: false,
        })
    }

    /// OS process id (also the process group id on Unix).
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next chunk from either pipe, or `None` once both are closed.
    ///
    /// Cancel safe.
    pub async fn next_chunk(&mut self) -> Option<OutputChunk> {
        self.output.recv().await
    }

    /// Wait for the child to exit and return its exit code.
    ///
    /// Cancel safe.
    pub async fn wait(&mut self) -> Result<i32, ProcessError> {
        let status = self.child.wait().await.map_err(ProcessError::Wait)?;
        Ok(self.reap(status))
    }

    /// Drain all output and wait for exit.
    pub async fn collect(mut self) -> Result<ProcessOutput, ProcessError> {
        self.read_to_end().await
    }

    /// Like [`collect`](Self::collect) but keeps the handle, so the caller
    /// can still [`terminate`](Self::terminate) it.
    ///
    /// Not cancel safe: output read before cancellation is lost.
    pub async fn read_to_end(&mut self) -> Result<ProcessOutput, ProcessError> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(chunk) = self.next_chunk().await {
            match chunk {
                OutputChunk::Stdout(data) => stdout.push_str(&data),
                OutputChunk::Stderr(data) => stderr.push_str(&data),
            }
        }

        let exit_code = self.wait().await?;
        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    /// Stop the child: SIGTERM now, SIGKILL if it is still alive after
    /// `grace`. Best effort; returns the exit code if the child was reaped.
    pub async fn terminate(&mut self, grace: Duration) -> Option<i32> {
        self.signal(Signal::Term);

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => return Some(self.reap(status)),
            Ok(Err(e)) => {
                debug!(pid = ?self.pid, error = %e, "Wait after SIGTERM failed");
                return None;
            }
            Err(_) => {
                warn!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Child still running after grace period, force killing"
                );
            }
        }

        self.signal(Signal::Kill);
        match self.child.wait().await {
            Ok(status) => Some(self.reap(status)),
            Err(e) => {
                debug!(pid = ?self.pid, error = %e, "Wait after SIGKILL failed");
                None
            }
        }
    }

    fn reap(&mut self, status: ExitStatus) -> i32 {
        self.reaped = true;
        exit_code(status)
    }

    #[cfg(unix)]
    fn signal(&mut self, signal: Signal) {
        let Some(pid) = self.pid.filter(|_| !self.reaped) else {
            return;
        };
        let signo = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };

        // The child leads its own process group; a negative pid targets it.
        let rc = unsafe { libc::kill(-(pid as i32), signo) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            debug!(pid, signal = ?signal, error = %err, "Signal not delivered");
        }

        if matches!(signal, Signal::Kill) {
            if let Err(e) = self.child.start_kill() {
                debug!(pid, error = %e, "start_kill failed");
            }
        }
    }

    #[cfg(not(unix))]
    fn signal(&mut self, signal: Signal) {
        if let Err(e) = self.child.start_kill() {
            debug!(pid = ?self.pid, signal = ?signal, error = %e, "start_kill failed");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        debug!(pid = ?self.pid, "Handle dropped with child unreaped, killing process group");
        self.signal(Signal::Kill);
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNAL_EXIT_CODE)
}

fn spawn_reader<R>(mut pipe: R, wrap: fn(String) -> OutputChunk, tx: mpsc::Sender<OutputChunk>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut chunker = Utf8Chunker::default();

        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let text = chunker.decode(&buf[..n]);
                    if !text.is_empty() && tx.send(wrap(text)).await.is_err() {
                        // Consumer went away.
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Error reading child pipe");
                    break;
                }
            }
        }

        let rest = chunker.finish();
        if !rest.is_empty() {
            let _ = tx.send(wrap(rest)).await;
        }
    });
}
