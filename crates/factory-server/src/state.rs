//! Shared application state.

use std::sync::Arc;

use factory_process::ProcessRunner;

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::orchestrator::BatchOrchestrator;
use crate::requirements::RequirementDetector;

/// Shared application state.
///
/// Holds only immutable configuration and shared collaborators; each batch
/// invocation owns its own state.
pub struct AppState {
    /// Runs the Driver.
    pub orchestrator: BatchOrchestrator,

    /// Probes installed tools and auth.
    pub detector: RequirementDetector,

    /// Deploy token storage behind `/api/token`.
    pub credentials: Arc<dyn CredentialStore>,
}

impl AppState {
    /// Wire up the collaborators and wrap the state in Arc.
    pub fn new(
        config: &Config,
        runner: Arc<dyn ProcessRunner>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            orchestrator: BatchOrchestrator::new(
                runner.clone(),
                credentials.clone(),
                config.orchestrator(),
            ),
            detector: RequirementDetector::new(
                runner,
                credentials.clone(),
                config.shell.clone(),
                config.detect_script(),
            ),
            credentials,
        })
    }

    /// Build state from already constructed parts.
    pub fn from_parts(
        orchestrator: BatchOrchestrator,
        detector: RequirementDetector,
        credentials: Arc<dyn CredentialStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            detector,
            credentials,
        })
    }
}
