//! Setup probe: which tools are installed and whether deploys are authorised.

use std::path::PathBuf;
use std::sync::Arc;

use factory_core::{AuthSource, Requirements};
use factory_process::{CommandSpec, ProcessError, ProcessRunner};
use thiserror::Error;
use tracing::{info, warn};

use crate::credentials::CredentialStore;

/// Errors from requirement detection.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The detector script exited non-zero.
    #[error("{0}")]
    Failed(String),
}

/// Runs the detector script and folds in the credential store.
pub struct RequirementDetector {
    runner: Arc<dyn ProcessRunner>,
    credentials: Arc<dyn CredentialStore>,
    shell: String,
    script: PathBuf,
}

impl RequirementDetector {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        credentials: Arc<dyn CredentialStore>,
        shell: impl Into<String>,
        script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            credentials,
            shell: shell.into(),
            script: script.into(),
        }
    }

    /// Probe the machine.
    ///
    /// A token in the credential store counts as deploy auth even when the
    /// script found none in the environment or CLI config.
    pub async fn detect(&self) -> Result<Requirements, DetectError> {
        let spec = CommandSpec::new(&self.shell).arg(self.script.display().to_string());
        let output = self.runner.run(&spec).await?;

        if output.exit_code != 0 {
            let stderr = output.stderr.trim();
            warn!(exit_code = output.exit_code, stderr = %stderr, "Requirement detection failed");
            return Err(DetectError::Failed(if stderr.is_empty() {
                "requirement detection failed".to_string()
            } else {
                stderr.to_string()
            }));
        }

        let mut requirements = Requirements::parse(&output.stdout);

        if !requirements.railway_auth {
            match self.credentials.read_token().await {
                Ok(Some(_)) => {
                    requirements.railway_auth = true;
                    requirements.railway_auth_source = AuthSource::Keychain;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Credential lookup failed, treating as absent"),
            }
        }

        info!(
            provider = ?requirements.provider,
            railway_auth = requirements.railway_auth,
            "Requirements detected"
        );
        Ok(requirements)
    }
}
