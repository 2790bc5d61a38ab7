//! HTTP server implementation for the remote-read proxy.

use std::net::SocketAddr;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use tokio::signal;

use super::handlers::{AppState, handle_healthy, handle_metrics, handle_read, handle_ready};
use super::middleware::{trace_requests, track_metrics};
use crate::error::{Error, Result};

/// Build the application router with routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    Router::new()
        .route("/read", post(handle_read))
        .route("/api/v1/read", post(handle_read))
        .route("/metrics", get(handle_metrics))
        .route("/-/healthy", get(handle_healthy))
        .route("/-/ready", get(handle_ready))
        .layer(from_fn(trace_requests))
        .layer(from_fn_with_state(metrics, track_metrics))
        .with_state(state)
}

/// HTTP server for the remote-read proxy.
pub struct ProxyServer {
    state: AppState,
    listen: SocketAddr,
}

impl ProxyServer {
    pub fn new(state: AppState, listen: SocketAddr) -> Self {
        Self { state, listen }
    }

    /// Run the HTTP server until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let app = build_router(self.state);

        tracing::info!("Starting remote-read proxy on {}", self.listen);
        let listener = tokio::net::TcpListener::bind(self.listen)
            .await
            .map_err(|e| Error::Internal(format!("failed to bind {}: {}", self.listen, e)))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("server error: {}", e)))?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Listen for SIGTERM (K8s pod termination) and SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
