//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::OrchestratorConfig;

/// Script that runs the whole batch.
pub const DRIVER_SCRIPT: &str = "run-agent-factory-batch.sh";

/// Script that reports installed tools and auth status.
pub const DETECT_SCRIPT: &str = "detect-requirements.sh";

/// Which secret store backs `/api/token`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CredentialBackend {
    /// macOS Keychain through the `security` CLI.
    #[default]
    Keychain,
    /// Process memory; lost on restart.
    Memory,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address.
    pub bind_addr: String,

    /// Interpreter used to run the scripts.
    pub shell: String,

    /// Directory holding the driver and detector scripts.
    pub script_root: PathBuf,

    /// Directory the agent CLI runs in (`AGENT_FACTORY_CWD`).
    pub target_dir: PathBuf,

    /// Base for relative and default work roots.
    pub base_dir: PathBuf,

    /// Heartbeat interval handed to the driver (seconds).
    pub heartbeat_interval_secs: u64,

    /// Time between SIGTERM and SIGKILL when an observer disconnects.
    pub kill_grace_ms: u64,

    /// How long open connections may take to finish after a shutdown signal.
    pub shutdown_deadline_secs: u64,

    pub credential_backend: CredentialBackend,
}

impl Default for Config {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            bind_addr: "127.0.0.1:8890".to_string(),
            shell: "/bin/bash".to_string(),
            script_root: cwd.join("../../../plugins/agent-factory-mac-app/skills/scripts"),
            target_dir: cwd.clone(),
            base_dir: cwd,
            heartbeat_interval_secs: 15,
            kill_grace_ms: 1200,
            shutdown_deadline_secs: 10,
            credential_backend: CredentialBackend::default(),
        }
    }
}

impl Config {
    /// Full path of the batch driver script.
    pub fn driver_script(&self) -> PathBuf {
        self.script_root.join(DRIVER_SCRIPT)
    }

    /// Full path of the requirement detector script.
    pub fn detect_script(&self) -> PathBuf {
        self.script_root.join(DETECT_SCRIPT)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }

    /// Orchestrator settings derived from this config.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            shell: self.shell.clone(),
            driver_script: self.driver_script(),
            target_dir: self.target_dir.clone(),
            base_dir: self.base_dir.clone(),
            heartbeat_interval_secs: self.heartbeat_interval_secs,
            kill_grace: Duration::from_millis(self.kill_grace_ms),
        }
    }
}
