//! HTTP surface.
//!
//! Routes:
//! - `GET /leaks/go/{user}/{repo}` - analyse (or return the cached report)
//! - `GET /leaks/go/all/{skip}/{limit}` - page through stored reports
//! - `GET /health` - liveness

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::orchestrator::Orchestrator;

pub mod routes;

/// Server state
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Build the router for the given orchestrator.
pub fn router(orchestrator: Orchestrator) -> Router {
    let state = Arc::new(AppState { orchestrator });

    Router::new()
        .route("/leaks/go/all/{skip}/{limit}", get(routes::list_repositories))
        .route("/leaks/go/{user}/{repo}", get(routes::analyse))
        .route("/health", get(routes::health))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn start_server(addr: SocketAddr, orchestrator: Orchestrator) -> anyhow::Result<()> {
    let app = router(orchestrator);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Serving on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
