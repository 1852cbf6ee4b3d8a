//! The master: owns the frontier, runs the coordinator loop, and serves the
//! control-plane API. Grounded in `master_service.py`'s `MasterService`,
//! which bundled the same three responsibilities behind one Flask app and
//! three background threads (spec.md §2/§5).

pub mod api;
pub mod coordinator;
pub mod frontier;

use crate::bb::BulletinBoard;
use crate::common::config::Config;
use crate::queue::TaskBus;
use frontier::Frontier;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Shared, mutex-guarded master state — the single point of synchronization
/// between the coordinator loop and the control-plane API (spec.md §5).
pub struct MasterState {
    pub frontier: Arc<Mutex<Frontier>>,
}

impl MasterState {
    pub fn new() -> Self {
        Self {
            frontier: Arc::new(Mutex::new(Frontier::new())),
        }
    }
}

impl Default for MasterState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Master {
    pub state: MasterState,
    pub bb: BulletinBoard,
    pub bus: TaskBus,
    pub config: Config,
}

impl Master {
    pub async fn connect(config: Config) -> crate::common::error::Result<Self> {
        let bb = BulletinBoard::connect(&config.bulletin_board.redis_url).await?;
        let bus = TaskBus::connect(
            &config.task_bus.aws_region,
            config.task_bus.crawler_queue_url.clone(),
            config.task_bus.indexer_queue_url.clone(),
            config.task_bus.visibility_timeout_secs,
        )
        .await;

        Ok(Self {
            state: MasterState::new(),
            bb,
            bus,
            config,
        })
    }

    /// Run the coordinator loop and the control-plane API concurrently
    /// until either exits (or `shutdown` fires).
    pub async fn run(self, shutdown: tokio::sync::watch::Receiver<bool>) -> crate::common::error::Result<()> {
        let frontier = self.state.frontier.clone();
        let bb = self.bb.clone();
        let bus = self.bus.clone();
        let config = self.config.clone();

        let coordinator_shutdown = shutdown.clone();
        let coordinator_handle = tokio::spawn(async move {
            coordinator::run(frontier, bb, bus, config, coordinator_shutdown).await;
        });

        let metrics = api::new_metrics();
        let rate_limiter = api::new_rate_limiter(self.config.api.rate_limit_per_minute);
        let app_state = api::AppState {
            frontier: self.state.frontier.clone(),
            bb: self.bb.clone(),
            metrics,
            rate_limiter,
            heartbeat_detection_ttl: self.config.crawler.heartbeat_detection_ttl(),
        };
        let router = api::create_router(app_state);
        let addr: std::net::SocketAddr =
            format!("{}:{}", self.config.api.host, self.config.api.port).parse()
                .map_err(|e: std::net::AddrParseError| {
                    crate::common::error::Error::Unknown(e.to_string())
                })?;
        info!(%addr, "control-plane API listening");
        let listener = tokio::net::TcpListener::bind(addr).await?;

        let mut api_shutdown = shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.changed().await;
            })
            .await?;

        coordinator_handle.await.map_err(|e| crate::common::error::Error::Unknown(e.to_string()))?;
        Ok(())
    }
}
