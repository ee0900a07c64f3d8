//! HTTP server for the batch console.
//!
//! Provides endpoints for:
//! - Health check (`/api/health`)
//! - Setup probe (`/api/requirements`)
//! - Deploy token storage (`/api/token`)
//! - Buffered batch runs (`/api/run-batch`)
//! - Streamed batch runs (`/api/run-batch-stream`)

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::AppState;
use crate::supervisor;

pub mod error;
mod handlers;
pub mod ndjson;
pub mod responses;

pub use error::ApiError;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // The browser UI may be served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // API routes
        .route("/api/health", get(handlers::health_check))
        .route("/api/requirements", get(handlers::get_requirements))
        .route("/api/token", post(handlers::save_token))
        .route("/api/run-batch", post(handlers::run_batch))
        .route("/api/run-batch-stream", post(handlers::run_batch_stream))
        // Browser probes
        .route(
            "/.well-known/appspecific/com.chrome.devtools.json",
            get(handlers::devtools_probe),
        )
        .route("/favicon.ico", get(handlers::favicon))
        .layer(CatchPanicLayer::custom(supervisor::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `listener` until `signal` resolves.
///
/// On shutdown the orchestrator is stopped first, which ends open streams,
/// then connections get at most `deadline` to finish.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    signal: F,
    deadline: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let orchestrator = state.orchestrator.clone();
    let stopping = orchestrator.clone();
    let server = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            signal.await;
            stopping.shutdown();
        })
        .into_future();

    let expired = async {
        orchestrator.shutdown_requested().await;
        tokio::time::sleep(deadline).await;
    };

    tokio::select! {
        result = server => result?,
        _ = expired => {
            warn!(
                deadline_secs = deadline.as_secs(),
                "Connections still open after shutdown deadline, closing them"
            );
        }
    }

    let grace = orchestrator.config().kill_grace * 2;
    if !orchestrator.wait_idle(grace).await {
        warn!("Batch invocations still running at exit");
    }
    info!("HTTP server stopped");
    Ok(())
}
