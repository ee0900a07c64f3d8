//! Batch orchestration: validate, resolve, run the Driver and report.

mod invocation;
mod stream;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use factory_core::{BatchResult, CoreError, InvocationId, RunBatchBody, RunRequest, StreamEvent};
use factory_process::{CommandSpec, ProcessError, ProcessRunner};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::credentials::CredentialStore;

pub use invocation::BatchInvocation;
pub use stream::{EventSink, ORCHESTRATOR_FAULT, SHUTDOWN_MESSAGE};

/// Events buffered between the invocation task and the HTTP body.
pub const SINK_CAPACITY: usize = 256;

/// Default work root, relative to the base directory.
const DEFAULT_WORK_ROOT: &str = ".context/agent-factory-web-runs";

/// Settings for running the Driver.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Interpreter the Driver script is handed to.
    pub shell: String,
    pub driver_script: PathBuf,
    /// Exported to the Driver as `AGENT_FACTORY_CWD`.
    pub target_dir: PathBuf,
    /// Base for relative and default work roots, and the Driver's cwd.
    pub base_dir: PathBuf,
    pub heartbeat_interval_secs: u64,
    /// Time between SIGTERM and SIGKILL on disconnect or shutdown.
    pub kill_grace: Duration,
}

/// Errors returned before any output is produced.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    InvalidRequest(#[from] CoreError),

    #[error(transparent)]
    Spawn(#[from] ProcessError),

    /// The server stopped accepting or finishing runs.
    #[error("server shutting down")]
    ShuttingDown,
}

/// A validated request turned into a concrete Driver command.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub id: InvocationId,
    pub work_root: PathBuf,
    pub command: CommandSpec,
}

/// Runs the Driver on behalf of HTTP requests.
///
/// Cheap to clone; every invocation is independent. Clones share one
/// shutdown token: after [`shutdown`](Self::shutdown) no new run starts and
/// running Drivers are terminated.
#[derive(Clone)]
pub struct BatchOrchestrator {
    runner: Arc<dyn ProcessRunner>,
    credentials: Arc<dyn CredentialStore>,
    config: Arc<OrchestratorConfig>,
    shutdown: CancellationToken,
    streams: TaskTracker,
}

impl BatchOrchestrator {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        credentials: Arc<dyn CredentialStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runner,
            credentials,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
            streams: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Stop taking runs and terminate every running Driver.
    ///
    /// Open streams end with `error{"server shutting down"}`, buffered
    /// requests fail with [`BatchError::ShuttingDown`]. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(active_streams = self.streams.len(), "Stopping batch orchestrator");
        }
        self.shutdown.cancel();
        self.streams.close();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }

    /// Wait up to `timeout` for every streamed invocation to finish.
    /// Returns false if some are still running.
    ///
    /// Only meaningful after [`shutdown`](Self::shutdown).
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.streams.wait()).await.is_ok()
    }

    /// Validate `body` and build the Driver command. Spawns nothing.
    pub async fn prepare(&self, body: RunBatchBody) -> Result<PreparedRun, BatchError> {
        if self.is_shutting_down() {
            return Err(BatchError::ShuttingDown);
        }
        let request = RunRequest::from_body(body)?;
        let work_root = self.resolve_work_root(request.work_root());

        let token = match request.auth_token() {
            Some(token) => Some(token.to_string()),
            None => self.stored_token().await,
        };

        let command = self.driver_command(&request, &work_root, token.as_deref());
        Ok(PreparedRun {
            id: InvocationId::generate(),
            work_root,
            command,
        })
    }

    /// Run the Driver to completion and return its outcome.
    ///
    /// Dropping the returned future kills the Driver's process group.
    pub async fn run_buffered(&self, body: RunBatchBody) -> Result<BatchResult, BatchError> {
        let run = self.prepare(body).await?;
        info!(
            invocation_id = %run.id,
            work_root = %run.work_root.display(),
            "Starting buffered batch"
        );

        let mut handle = self.runner.spawn(&run.command).await?;
        let output = tokio::select! {
            output = handle.read_to_end() => Some(output?),
            _ = self.shutdown.cancelled() => None,
        };
        let Some(output) = output else {
            warn!(
                invocation_id = %run.id,
                pid = ?handle.pid(),
                "Server shutting down, terminating buffered driver"
            );
            let exit_code = handle.terminate(self.config.kill_grace).await;
            info!(invocation_id = %run.id, exit_code = ?exit_code, "Driver terminated");
            return Err(BatchError::ShuttingDown);
        };

        let result = BatchResult::from_output(
            output.exit_code,
            output.stdout,
            output.stderr,
            run.work_root.display().to_string(),
        );

        info!(
            invocation_id = %run.id,
            exit_code = result.exit_code,
            total = result.summary.total,
            success = result.summary.success,
            failed = result.summary.failed,
            "Buffered batch finished"
        );
        Ok(result)
    }

    /// Start a streamed run.
    ///
    /// Validation errors come back synchronously. Otherwise the returned
    /// receiver yields `start`, the Driver's output, and one terminal event.
    /// Dropping the receiver terminates the Driver.
    pub async fn run_stream(
        &self,
        body: RunBatchBody,
    ) -> Result<mpsc::Receiver<StreamEvent>, BatchError> {
        let run = self.prepare(body).await?;
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);

        stream::launch(
            &self.streams,
            self.runner.clone(),
            BatchInvocation::new(run),
            EventSink::new(tx),
            stream::Stop {
                shutdown: self.shutdown.clone(),
                kill_grace: self.config.kill_grace,
            },
        );
        Ok(rx)
    }

    fn resolve_work_root(&self, requested: Option<&PathBuf>) -> PathBuf {
        match requested {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.config.base_dir.join(path),
            None => self.config.base_dir.join(DEFAULT_WORK_ROOT),
        }
    }

    async fn stored_token(&self) -> Option<String> {
        match self.credentials.read_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Credential lookup failed, running without a token");
                None
            }
        }
    }

    fn driver_command(&self, request: &RunRequest, work_root: &Path, token: Option<&str>) -> CommandSpec {
        let mut command = CommandSpec::new(&self.config.shell)
            .current_dir(self.config.base_dir.clone())
            .arg(self.config.driver_script.display().to_string())
            .arg(request.count().to_string())
            .arg(work_root.display().to_string())
            .env("AGENT_FACTORY_COMMAND", request.command_template())
            .env("AGENT_FACTORY_CWD", self.config.target_dir.display().to_string())
            .env("RUN_TIMEOUT_SECONDS", request.timeout_seconds().to_string())
            .env(
                "RUN_HEARTBEAT_SECONDS",
                self.config.heartbeat_interval_secs.to_string(),
            );

        if let Some(token) = token {
            command = command.env("RAILWAY_TOKEN", token);
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryStore;
    use crate::testing::SpyRunner;

    fn orchestrator(store: MemoryStore) -> (Arc<SpyRunner>, BatchOrchestrator) {
        let spy = Arc::new(SpyRunner::default());
        let config = OrchestratorConfig {
            shell: "/bin/bash".to_string(),
            driver_script: PathBuf::from("/opt/scripts/run-agent-factory-batch.sh"),
            target_dir: PathBuf::from("/srv/target"),
            base_dir: PathBuf::from("/srv/base"),
            heartbeat_interval_secs: 15,
            kill_grace: Duration::from_millis(1200),
        };
        (spy.clone(), BatchOrchestrator::new(spy, Arc::new(store), config))
    }

    #[tokio::test]
    async fn test_driver_command_and_env() {
        let (_, orch) = orchestrator(MemoryStore::new());
        let body = RunBatchBody::new(3, "claude -p {prompt}")
            .with_work_root("/tmp/runs")
            .with_timeout_seconds(90);

        let run = orch.prepare(body).await.unwrap();
        let cmd = &run.command;

        assert_eq!(cmd.program(), "/bin/bash");
        assert_eq!(
            cmd.get_args(),
            ["/opt/scripts/run-agent-factory-batch.sh", "3", "/tmp/runs"]
        );
        assert_eq!(cmd.env_value("AGENT_FACTORY_COMMAND"), Some("claude -p {prompt}"));
        assert_eq!(cmd.env_value("AGENT_FACTORY_CWD"), Some("/srv/target"));
        assert_eq!(cmd.env_value("RUN_TIMEOUT_SECONDS"), Some("90"));
        assert_eq!(cmd.env_value("RUN_HEARTBEAT_SECONDS"), Some("15"));
        assert_eq!(cmd.env_value("RAILWAY_TOKEN"), None);
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/srv/base")));
    }

    #[tokio::test]
    async fn test_work_root_resolution() {
        let (_, orch) = orchestrator(MemoryStore::new());

        let run = orch.prepare(RunBatchBody::new(1, "x")).await.unwrap();
        assert_eq!(
            run.work_root,
            PathBuf::from("/srv/base/.context/agent-factory-web-runs")
        );

        let run = orch
            .prepare(RunBatchBody::new(1, "x").with_work_root("runs/today"))
            .await
            .unwrap();
        assert_eq!(run.work_root, PathBuf::from("/srv/base/runs/today"));
    }

    #[tokio::test]
    async fn test_token_precedence() {
        let (_, orch) = orchestrator(MemoryStore::with_token("stored"));

        let run = orch.prepare(RunBatchBody::new(1, "x")).await.unwrap();
        assert_eq!(run.command.env_value("RAILWAY_TOKEN"), Some("stored"));

        let run = orch
            .prepare(RunBatchBody::new(1, "x").with_auth_token("explicit"))
            .await
            .unwrap();
        assert_eq!(run.command.env_value("RAILWAY_TOKEN"), Some("explicit"));
    }

    #[tokio::test]
    async fn test_invalid_request_spawns_nothing() {
        let (spy, orch) = orchestrator(MemoryStore::new());

        let err = orch.run_buffered(RunBatchBody::new(0, "x")).await.unwrap_err();
        assert!(matches!(err, BatchError::InvalidRequest(_)));

        let err = orch.run_stream(RunBatchBody::new(101, "x")).await.unwrap_err();
        assert_eq!(err.to_string(), "count must be an integer between 1 and 100");

        assert_eq!(spy.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_no_runs_after_shutdown() {
        let (spy, orch) = orchestrator(MemoryStore::new());
        let other = orch.clone();
        orch.shutdown();
        orch.shutdown();

        assert!(other.is_shutting_down());
        let err = other.run_buffered(RunBatchBody::new(1, "x")).await.unwrap_err();
        assert!(matches!(err, BatchError::ShuttingDown));
        let err = other.run_stream(RunBatchBody::new(1, "x")).await.unwrap_err();
        assert_eq!(err.to_string(), SHUTDOWN_MESSAGE);

        assert_eq!(spy.spawn_count(), 0);
        assert!(other.wait_idle(Duration::from_millis(100)).await);
    }
}
