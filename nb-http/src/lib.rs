pub mod envelope;
pub mod render;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::sync::watch;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use state::{ApiState, ReloadReason};

/// Build the HTTP delivery plane's router (§4.D): the fixed iPXE/config/
/// deployment/health routes, falling back to a plain static file server
/// rooted at `state.doc_root` for everything else (`/` and subpaths).
pub fn build_router(state: ApiState) -> Router {
    let doc_root = state.doc_root.clone();

    Router::new()
        .merge(routes::health::router())
        .merge(routes::ipxe::router())
        .merge(routes::deployment::router())
        .merge(routes::config::router())
        .with_state(state)
        .fallback_service(ServeDir::new(doc_root))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP delivery plane on `addr` until `shutdown` reports `true`,
/// draining in-flight requests via axum's graceful shutdown (§5).
pub async fn run_http_server(addr: SocketAddr, state: ApiState, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding HTTP listener on {addr}"))?;

    tracing::info!("HTTP delivery plane listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
