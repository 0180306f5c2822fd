//! HTTP surface.
//!
//! `POST /ask`, `GET /health` and `GET /` on an axum router, with request
//! spans from tower-http and graceful shutdown on the process cancel token.

pub mod handlers;
pub mod response;

pub use handlers::{AskRequest, HealthBody};
pub use response::{status_for, ApiError, AskResponse, ErrorBody};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::bootstrap::BootstrapState;
use crate::error::{AskError, Result};
use crate::pipeline::Pipeline;

/// State shared by every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub bootstrap: watch::Receiver<BootstrapState>,
    /// Cancelled on shutdown; each request runs under a child token.
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(
        pipeline: Pipeline,
        bootstrap: watch::Receiver<BootstrapState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            bootstrap,
            cancel,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/ask", post(handlers::ask))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `state.cancel` fires, then drains in-flight requests.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let cancel = state.cancel.clone();
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| AskError::internal(format!("server error: {e}")))
}

/// Cancels `cancel` on Ctrl-C or SIGTERM.
pub fn cancel_on_shutdown_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        cancel.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
