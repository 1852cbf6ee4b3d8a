//! Minimal `/metrics` + `/health` axum app for a worker process, mirroring
//! the control-plane API's own `/metrics` handler without pulling in the
//! rest of the master's router (SPEC_FULL.md ambient-stack: every
//! long-running process exposes Prometheus metrics, not just the master).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::error;

#[derive(Clone)]
struct MetricsState {
    registry: Registry,
}

async fn metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = state.registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).unwrap();
    (StatusCode::OK, [("Content-Type", encoder.format_type())], buffer)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Bind and serve `/metrics` + `/health` on `addr` until the process exits.
/// Runs as a background task: a bind failure is logged, not propagated,
/// since a worker's own task-consuming loop must keep running even if this
/// side app never comes up.
pub async fn serve(registry: Registry, addr: SocketAddr) {
    let router = Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(MetricsState { registry });

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "worker metrics server exited");
            }
        }
        Err(e) => error!(%addr, error = %e, "failed to bind worker metrics server"),
    }
}
