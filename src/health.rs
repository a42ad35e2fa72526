//! HTTP Health Check
//!
//! A tiny HTTP endpoint for load balancers and orchestrators:
//! `GET /healthz` answers `200 ok`. It runs on its own port and shares
//! nothing with the cache listener.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

/// Builds the health check router.
pub fn router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Serves the health check on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Health check listening on http://{}/healthz", addr);
    }
    axum::serve(listener, router()).await
}
