//! Agent Factory Batch Console Server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use factory_process::{ProcessRunner, TokioProcessRunner};
use factory_server::credentials::{CredentialStore, KeychainStore, MemoryStore};
use factory_server::{http, supervisor, AppState, Config, CredentialBackend};

/// Agent Factory batch console server.
#[derive(Parser, Debug)]
#[command(name = "factory-server")]
#[command(about = "Run Agent Factory batches from the browser", long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8890)]
    port: u16,

    /// Directory holding run-agent-factory-batch.sh and detect-requirements.sh
    #[arg(long, env = "AF_SCRIPT_ROOT")]
    script_root: Option<PathBuf>,

    /// Directory the agent CLI runs in
    #[arg(long, env = "AGENT_FACTORY_CWD")]
    target_dir: Option<PathBuf>,

    /// Interpreter used to run the scripts
    #[arg(long, default_value = "/bin/bash")]
    shell: String,

    /// Where the deploy token is stored
    #[arg(long, value_enum, default_value_t = CredentialBackend::Keychain)]
    credential_store: CredentialBackend,

    /// Seconds open connections get to finish after Ctrl-C or SIGTERM
    #[arg(long, default_value_t = 10)]
    shutdown_timeout: u64,
}

impl Args {
    fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            bind_addr: format!("{}:{}", self.host, self.port),
            shell: self.shell,
            script_root: self.script_root.unwrap_or(defaults.script_root),
            target_dir: self.target_dir.unwrap_or(defaults.target_dir),
            credential_backend: self.credential_store,
            shutdown_deadline_secs: self.shutdown_timeout,
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("factory=info,tower_http=info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    supervisor::install_panic_hook();

    let config = Args::parse().into_config();
    let addr: SocketAddr = config.bind_addr.parse()?;

    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new());
    let credentials: Arc<dyn CredentialStore> = match config.credential_backend {
        CredentialBackend::Keychain => Arc::new(KeychainStore::new(runner.clone())),
        CredentialBackend::Memory => Arc::new(MemoryStore::new()),
    };

    info!(
        script_root = %config.script_root.display(),
        target_dir = %config.target_dir.display(),
        shell = %config.shell,
        credential_store = ?config.credential_backend,
        "Starting Agent Factory console"
    );

    let state = AppState::new(&config, runner, credentials);

    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", addr);

    let server = http::serve(
        listener,
        state,
        supervisor::shutdown_signal(),
        config.shutdown_deadline(),
    );
    let forced = async {
        supervisor::shutdown_signal().await;
        supervisor::shutdown_signal().await;
    };

    tokio::select! {
        result = server => result?,
        // Dropping the runtime drops every process handle, which kills its group.
        _ = forced => warn!("Second shutdown signal, exiting now"),
    }

    info!("Server stopped");
    Ok(())
}
