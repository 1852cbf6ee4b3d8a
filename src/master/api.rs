//! The master's control-plane API (CPA): `POST /seed`, `GET /state`,
//! `GET /health`, `GET /metrics`. Router shape follows the teacher's own
//! `axum`/`tower-http` stack (CORS + trace layers), generalized from the
//! original `master_service.py` Flask app's three JSON endpoints (spec.md
//! §4.4), with `/metrics` added for the ambient observability stack
//! (SPEC_FULL.md §0).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use governor::{Quota, RateLimiter};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::bb::{BulletinBoard, WorkerKind};
use crate::master::frontier::Frontier;

pub struct Metrics {
    pub registry: Registry,
    pub seeds_accepted: IntCounter,
    pub seeds_rejected: IntCounter,
    pub frontier_size: IntGauge,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();
        let seeds_accepted = IntCounter::new(
            "crawlfabric_seeds_accepted_total",
            "URLs accepted through POST /seed",
        )
        .unwrap();
        let seeds_rejected = IntCounter::new(
            "crawlfabric_seeds_rejected_total",
            "URLs rejected by domain policy or already crawled",
        )
        .unwrap();
        let frontier_size = IntGauge::new(
            "crawlfabric_frontier_size",
            "Number of URLs currently queued",
        )
        .unwrap();
        registry.register(Box::new(seeds_accepted.clone())).unwrap();
        registry.register(Box::new(seeds_rejected.clone())).unwrap();
        registry.register(Box::new(frontier_size.clone())).unwrap();
        Self {
            registry,
            seeds_accepted,
            seeds_rejected,
            frontier_size,
        }
    }
}

type ApiRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Clone)]
pub struct AppState {
    pub frontier: Arc<tokio::sync::Mutex<Frontier>>,
    pub bb: BulletinBoard,
    pub metrics: Arc<Metrics>,
    pub rate_limiter: Arc<ApiRateLimiter>,
    pub heartbeat_detection_ttl: std::time::Duration,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/seed", post(seed))
        .route("/state", get(state_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `allowed_domains` is accepted as either a bare string or a list at the
/// HTTP layer (spec.md §9 Open Question) — lenient by design.
#[derive(Debug)]
struct StringOrList(Vec<String>);

impl<'de> Deserialize<'de> for StringOrList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Many(Vec<String>),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::One(s) => StringOrList(vec![s]),
            Repr::Many(v) => StringOrList(v),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SeedRequest {
    urls: Vec<String>,
    #[serde(default)]
    depth: Option<usize>,
    #[serde(default)]
    domains: Option<StringOrList>,
}

#[derive(Debug, Serialize)]
struct SeedResponse {
    queued: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

async fn seed(
    State(state): State<AppState>,
    Json(req): Json<SeedRequest>,
) -> Response {
    if state.rate_limiter.check().is_err() {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "rate limit exceeded".to_string(),
            }),
        )
            .into_response();
    }

    if req.urls.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "urls must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    // spec.md §4.4: seed under the options in effect *before* this call,
    // then update options for subsequent calls — matches the original's
    // `add_seed_urls(urls)` followed by `set_crawl_options(...)`.
    let mut frontier = state.frontier.lock().await;
    let admitted = frontier.add_seed_urls(&req.urls);
    if req.depth.is_some() || req.domains.is_some() {
        let max_depth = req.depth.unwrap_or_else(|| frontier.max_depth());
        let domains = req.domains.map(|d| d.0);
        frontier.set_crawl_options(max_depth, domains);
    }
    drop(frontier);

    state.metrics.seeds_accepted.inc_by(admitted as u64);
    state
        .metrics
        .seeds_rejected
        .inc_by((req.urls.len() - admitted) as u64);

    (StatusCode::ACCEPTED, Json(SeedResponse { queued: admitted })).into_response()
}

#[derive(Debug, Serialize)]
struct StateResponse {
    active_crawlers: Vec<String>,
    active_indexers: Vec<String>,
    urls_in_queue: Vec<String>,
    urls_crawled: Vec<String>,
}

async fn state_handler(State(state): State<AppState>) -> Response {
    let frontier = state.frontier.lock().await;
    let urls_in_queue = frontier.queued_urls();
    let urls_crawled = frontier.crawled_urls();
    drop(frontier);

    state.metrics.frontier_size.set(urls_in_queue.len() as i64);

    let active_crawlers = state
        .bb
        .live_workers(WorkerKind::Crawler, state.heartbeat_detection_ttl)
        .await
        .unwrap_or_default();
    let active_indexers = state
        .bb
        .live_workers(WorkerKind::Indexer, state.heartbeat_detection_ttl)
        .await
        .unwrap_or_default();

    Json(StateResponse {
        active_crawlers,
        active_indexers,
        urls_in_queue,
        urls_crawled,
    })
    .into_response()
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).unwrap();
    (
        StatusCode::OK,
        [("Content-Type", encoder.format_type())],
        buffer,
    )
}

pub fn new_metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new())
}

pub fn new_rate_limiter(per_minute: u32) -> Arc<ApiRateLimiter> {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::new(60).unwrap());
    Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)))
}

// Route wiring here talks to the Bulletin Board over a live Redis
// connection at construction time (`BulletinBoard::connect`), so it isn't
// exercised by unit tests. Seed-admission and frontier logic are covered
// directly in `master::frontier`.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_falls_back_to_60_per_minute_on_zero() {
        let limiter = new_rate_limiter(0);
        assert!(limiter.check().is_ok());
    }
}
