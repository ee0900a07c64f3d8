//! Test fixtures: stub Driver scripts and a counting runner.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use factory_core::StreamEvent;
use factory_process::{CommandSpec, ProcessError, ProcessHandle, ProcessRunner, TokioProcessRunner};
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::config::{DETECT_SCRIPT, DRIVER_SCRIPT};
use crate::credentials::{CredentialStore, MemoryStore};
use crate::orchestrator::{BatchOrchestrator, OrchestratorConfig};

/// Runner that counts spawns and delegates to a real runner.
#[derive(Default)]
pub struct SpyRunner {
    inner: TokioProcessRunner,
    spawns: AtomicUsize,
}

impl SpyRunner {
    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for SpyRunner {
    async fn spawn(&self, spec: &CommandSpec) -> Result<ProcessHandle, ProcessError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        self.inner.spawn(spec).await
    }
}

/// A temporary script root holding a stub Driver.
///
/// Scripts are run through `/bin/sh`, never executed directly.
pub struct StubDriver {
    dir: TempDir,
    runner: Arc<SpyRunner>,
    credentials: Arc<MemoryStore>,
}

impl StubDriver {
    pub fn new(driver_body: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(DRIVER_SCRIPT), driver_body).expect("write driver");
        Self {
            dir,
            runner: Arc::new(SpyRunner::default()),
            credentials: Arc::new(MemoryStore::new()),
        }
    }

    /// Also install a stub requirement detector.
    pub fn with_detector(self, body: &str) -> Self {
        std::fs::write(self.dir.path().join(DETECT_SCRIPT), body).expect("write detector");
        self
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn script_root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn spy(&self) -> Arc<SpyRunner> {
        self.runner.clone()
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        self.runner.clone()
    }

    pub fn credentials(&self) -> Arc<dyn CredentialStore> {
        self.credentials.clone()
    }

    pub fn config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            shell: "/bin/sh".to_string(),
            driver_script: self.dir.path().join(DRIVER_SCRIPT),
            target_dir: self.dir.path().to_path_buf(),
            base_dir: self.dir.path().to_path_buf(),
            heartbeat_interval_secs: 15,
            kill_grace: Duration::from_millis(300),
        }
    }

    pub fn orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(self.runner(), self.credentials(), self.config())
    }
}

/// Drain a stream until the sender side is gone.
pub async fn collect_events(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Poll `check` every 20 ms until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Whether `pid` is running. Zombies awaiting their reaper count as gone.
pub fn process_alive(pid: &str) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        return !stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z'));
    }
    std::process::Command::new("kill")
        .args(["-0", pid])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Poll for `path` and return its trimmed contents.
pub async fn read_when_written(path: &Path, timeout: Duration) -> String {
    let written = wait_for(timeout, || {
        std::fs::read_to_string(path).is_ok_and(|s| s.ends_with('\n'))
    })
    .await;
    assert!(written, "{} never written", path.display());
    std::fs::read_to_string(path).unwrap().trim().to_string()
}
