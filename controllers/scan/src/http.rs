//! Metrics and health endpoints.

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{Encoder, TextEncoder};
use tracing::info;

use crate::error::ControllerError;

async fn metrics() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buf)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buf).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
}

/// Serves /metrics and /healthz until the process exits.
pub async fn serve(addr: &str) -> Result<(), ControllerError> {
    info!("serving metrics on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_endpoint_renders_registered_metrics() {
        let counter =
            prometheus::IntCounter::new("kubescan_http_test_total", "test counter").unwrap();
        // default registry may already hold it from another test run
        let _ = prometheus::register(Box::new(counter.clone()));
        counter.inc();

        let body = metrics().await.unwrap();
        assert!(body.contains("kubescan_http_test_total"));
    }
}
