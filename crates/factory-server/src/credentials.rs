//! Deploy token storage.
//!
//! The console keeps a single secret: the deploy CLI token. On macOS it
//! lives in the login Keychain and is accessed through the `security` tool.

use std::sync::Arc;

use async_trait::async_trait;
use factory_process::{CommandSpec, ProcessError, ProcessRunner};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const KEYCHAIN_ACCOUNT: &str = "agent-factory-launcher";
const KEYCHAIN_SERVICE: &str = "railway-token";

/// Errors from the credential store.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The store tool could not be run.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The store rejected the operation.
    #[error("{0}")]
    Store(String),
}

/// Read/write access to the deploy token.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Current token, or `None` if nothing is stored.
    async fn read_token(&self) -> Result<Option<String>, CredentialError>;

    /// Store `token`, replacing any previous value.
    async fn write_token(&self, token: &str) -> Result<(), CredentialError>;
}

/// macOS Keychain backed store.
pub struct KeychainStore {
    runner: Arc<dyn ProcessRunner>,
    base: CommandSpec,
}

impl KeychainStore {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            base: CommandSpec::new("security"),
        }
    }

    /// Use a different `security`-compatible command. Subcommand arguments
    /// are appended to `base`.
    pub fn with_base_command(mut self, base: CommandSpec) -> Self {
        self.base = base;
        self
    }

    fn command(&self, action: &str) -> CommandSpec {
        self.base
            .clone()
            .arg(action)
            .args(["-a", KEYCHAIN_ACCOUNT, "-s", KEYCHAIN_SERVICE, "-w"])
    }
}

#[async_trait]
impl CredentialStore for KeychainStore {
    async fn read_token(&self) -> Result<Option<String>, CredentialError> {
        let output = match self.runner.run(&self.command("find-generic-password")).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Keychain lookup could not run");
                return Ok(None);
            }
        };

        if output.exit_code != 0 {
            debug!(exit_code = output.exit_code, "No token in keychain");
            return Ok(None);
        }

        let token = output.stdout.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    async fn write_token(&self, token: &str) -> Result<(), CredentialError> {
        let spec = self.command("add-generic-password").arg(token).arg("-U");
        let output = self.runner.run(&spec).await?;

        if output.exit_code != 0 {
            let stderr = output.stderr.trim();
            return Err(CredentialError::Store(if stderr.is_empty() {
                "failed to save token".to_string()
            } else {
                stderr.to_string()
            }));
        }

        info!("Token saved to keychain");
        Ok(())
    }
}

/// In-memory store for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    token: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn read_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.token.read().await.clone())
    }

    async fn write_token(&self, token: &str) -> Result<(), CredentialError> {
        *self.token.write().await = Some(token.to_string());
        Ok(())
    }
}
