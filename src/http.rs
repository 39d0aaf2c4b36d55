//! HTTP server for the Prometheus metrics endpoint.
//!
//! Runs on a separate tokio task and serves `/metrics` for Prometheus scraping.

use axum::{Router, routing::get};
use std::net::SocketAddr;

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `0.0.0.0:port`. Long-running; spawn it in the background.
pub async fn run_http_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind metrics endpoint");
            return;
        }
    };
    tracing::info!(%addr, "Prometheus HTTP server listening");

    if let Err(e) = axum::serve(listener, router()).await {
        tracing::error!(error = %e, "Metrics HTTP server error");
    }
}
