//! Spawning child processes.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::command::CommandSpec;
use crate::error::ProcessError;
use crate::handle::{ProcessHandle, ProcessOutput};

/// Starts child processes.
///
/// Implement this trait to intercept or fake process creation; the default
/// [`TokioProcessRunner`] spawns real children.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Start the child and return immediately with a live handle.
    async fn spawn(&self, spec: &CommandSpec) -> Result<ProcessHandle, ProcessError>;

    /// Start the child and wait for it to finish, capturing all output.
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        self.spawn(spec).await?.collect().await
    }
}

/// Runner backed by `tokio::process`.
///
/// Children get a closed stdin and piped stdout/stderr. On Unix each child
/// leads a new process group so that termination reaches its descendants.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, spec: &CommandSpec) -> Result<ProcessHandle, ProcessError> {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.get_args())
            .envs(spec.get_env().iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = spec.get_current_dir() {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        debug!(program = %spec.program(), args = ?spec.get_args(), "Spawning child process");

        let child = cmd.spawn().map_err(|source| {
            error!(program = %spec.program(), error = %source, "Failed to spawn child process");
            ProcessError::Spawn {
                program: spec.program().to_string(),
                source,
            }
        })?;

        let handle = ProcessHandle::attach(child)?;
        info!(program = %spec.program(), pid = ?handle.pid(), "Child process spawned");
        Ok(handle)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::handle::{OutputChunk, SIGNAL_EXIT_CODE};

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(script)
    }

    /// Running and not a zombie awaiting its reaper.
    fn alive(pid: i32) -> bool {
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            return !stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z'));
        }
        unsafe { libc::kill(pid, 0) == 0 }
    }

    async fn gone_within(pid: i32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }

    async fn first_line(handle: &mut ProcessHandle) -> String {
        let mut line = String::new();
        while !line.ends_with('\n') {
            match handle.next_chunk().await {
                Some(OutputChunk::Stdout(data)) => line.push_str(&data),
                Some(OutputChunk::Stderr(_)) => {}
                None => break,
            }
        }
        line.trim().to_string()
    }

    #[tokio::test]
    async fn test_run_captures_streams_and_exit_code() {
        let output = TokioProcessRunner::new()
            .run(&sh("echo out; echo err >&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_env_overlay_and_positional_args() {
        let spec = sh(r#"printf '%s|%s|%s' "$FOO" "$1" "$2""#)
            .args(["argv0", "3", "/tmp/runs"])
            .env("FOO", "bar");
        let output = TokioProcessRunner::new().run(&spec).await.unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "bar|3|/tmp/runs");
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let err = TokioProcessRunner::new()
            .run(&CommandSpec::new("/nonexistent/driver-binary"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/driver-binary"));
    }

    #[tokio::test]
    async fn test_signal_death_maps_to_fallback_code() {
        let output = TokioProcessRunner::new()
            .run(&sh("kill -9 $$"))
            .await
            .unwrap();
        assert_eq!(output.exit_code, SIGNAL_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_chunks_arrive_incrementally_in_order() {
        let mut handle = TokioProcessRunner::new()
            .spawn(&sh("echo a; sleep 0.2; echo b; echo c >&2"))
            .await
            .unwrap();

        let first = handle.next_chunk().await.unwrap();
        assert_eq!(first, OutputChunk::Stdout("a\n".to_string()));

        let mut stdout = String::from(first.data());
        let mut stderr = String::new();
        while let Some(chunk) = handle.next_chunk().await {
            match chunk {
                OutputChunk::Stdout(data) => stdout.push_str(&data),
                OutputChunk::Stderr(data) => stderr.push_str(&data),
            }
        }

        assert_eq!(stdout, "a\nb\n");
        assert_eq!(stderr, "c\n");
        assert_eq!(handle.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_terminate_graceful() {
        let mut handle = TokioProcessRunner::new()
            .spawn(&sh("trap 'exit 7' TERM; echo ready; while :; do sleep 0.05; done"))
            .await
            .unwrap();

        assert_eq!(
            handle.next_chunk().await,
            Some(OutputChunk::Stdout("ready\n".to_string()))
        );

        let code = handle.terminate(Duration::from_secs(5)).await;
        assert_eq!(code, Some(7));
    }

    #[tokio::test]
    async fn test_terminate_force_kills_after_grace() {
        let mut handle = TokioProcessRunner::new()
            .spawn(&sh("trap '' TERM; echo ready; while :; do sleep 0.05; done"))
            .await
            .unwrap();
        handle.next_chunk().await.unwrap();

        let grace = Duration::from_millis(300);
        let started = Instant::now();
        let code = handle.terminate(grace).await;

        assert!(started.elapsed() >= grace);
        assert_eq!(code, Some(SIGNAL_EXIT_CODE));
    }

    #[tokio::test]
    async fn test_terminate_after_exit_is_harmless() {
        let mut handle = TokioProcessRunner::new().spawn(&sh("exit 0")).await.unwrap();
        assert_eq!(handle.wait().await.unwrap(), 0);
        assert_eq!(handle.terminate(Duration::from_millis(50)).await, Some(0));
    }

    #[tokio::test]
    async fn test_drop_kills_whole_process_group() {
        let mut handle = TokioProcessRunner::new()
            .spawn(&sh("sleep 1000 & echo $!; wait"))
            .await
            .unwrap();
        let grandchild: i32 = first_line(&mut handle).await.parse().unwrap();
        let child = handle.pid().unwrap() as i32;
        assert!(alive(grandchild));

        drop(handle);

        assert!(gone_within(grandchild, Duration::from_secs(3)).await, "grandchild survived drop");
        assert!(gone_within(child, Duration::from_secs(3)).await, "child survived drop");
    }

    #[tokio::test]
    async fn test_cancelled_read_to_end_still_kills_group() {
        let mut handle = TokioProcessRunner::new()
            .spawn(&sh("sleep 1000 & echo $!; wait"))
            .await
            .unwrap();
        let grandchild: i32 = first_line(&mut handle).await.parse().unwrap();

        // The grandchild holds stdout open, so this never completes.
        let pending = tokio::time::timeout(Duration::from_millis(200), handle.read_to_end()).await;
        assert!(pending.is_err());
        assert!(alive(grandchild));

        drop(handle);
        assert!(gone_within(grandchild, Duration::from_secs(3)).await);
    }

    #[tokio::test]
    async fn test_read_to_end_keeps_handle() {
        let mut handle = TokioProcessRunner::new()
            .spawn(&sh("echo out; echo err >&2; exit 5"))
            .await
            .unwrap();
        let output = handle.read_to_end().await.unwrap();

        assert_eq!(output.exit_code, 5);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(handle.terminate(Duration::from_millis(50)).await, Some(5));
    }
}
