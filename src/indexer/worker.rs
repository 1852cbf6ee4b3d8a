//! The index worker's consumer loop: for `index_content(url, depth,
//! text_key)`, read text from AS, tokenize, and submit to SB under
//! document id `url` (spec.md §4.3). Heartbeat and pending bookkeeping
//! mirror the crawl worker's, under `active_indexers` /
//! `pending_urls_to_index`.

use crate::bb::{BulletinBoard, HeartbeatGuard, WorkerKind};
use crate::common::config::Config;
use crate::common::error::Result;
use crate::queue::{IndexTask, TaskBus};
use crate::search::tokenizer::tokenize_and_normalize;
use crate::search::{IndexDocument, SearchBackend};
use crate::storage::ArtifactStore;
use prometheus::{IntCounter, Registry};
use tracing::{error, info, warn};

/// Per-task counters exposed on the index worker's own `/metrics` endpoint.
pub struct WorkerMetrics {
    pub registry: Registry,
    pub tasks_succeeded: IntCounter,
    pub tasks_failed: IntCounter,
}

impl WorkerMetrics {
    fn new() -> Self {
        let registry = Registry::new();
        let tasks_succeeded =
            IntCounter::new("crawlfabric_index_tasks_succeeded_total", "Index tasks completed cleanly").unwrap();
        let tasks_failed =
            IntCounter::new("crawlfabric_index_tasks_failed_total", "Index tasks that hit a collaborator error").unwrap();
        registry.register(Box::new(tasks_succeeded.clone())).unwrap();
        registry.register(Box::new(tasks_failed.clone())).unwrap();
        Self { registry, tasks_succeeded, tasks_failed }
    }
}

#[derive(Clone)]
pub struct IndexWorker {
    bus: TaskBus,
    bb: BulletinBoard,
    artifacts: ArtifactStore,
    search: SearchBackend,
    config: Config,
    metrics: std::sync::Arc<WorkerMetrics>,
}

impl IndexWorker {
    pub fn new(
        bus: TaskBus,
        bb: BulletinBoard,
        artifacts: ArtifactStore,
        search: SearchBackend,
        config: Config,
    ) -> Self {
        Self {
            bus,
            bb,
            artifacts,
            search,
            config,
            metrics: std::sync::Arc::new(WorkerMetrics::new()),
        }
    }

    /// Registry backing this worker's `/metrics` side app.
    pub fn metrics_registry(&self) -> Registry {
        self.metrics.registry.clone()
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            let task = tokio::select! {
                received = self.bus.receive_index() => received,
                _ = shutdown.changed() => {
                    info!("index worker shutting down");
                    return;
                }
            };

            match task {
                Ok(Some(task)) => {
                    if let Err(e) = self.process(task).await {
                        error!(error = %e, "index task failed without clean completion");
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "failed to receive index task, retrying");
                }
            }
        }
    }

    async fn process(&self, task: IndexTask) -> Result<()> {
        let worker_id = WorkerKind::Indexer.worker_id(&task.task_id);

        let heartbeat = HeartbeatGuard::start(
            self.bb.clone(),
            WorkerKind::Indexer,
            worker_id.clone(),
            self.config.crawler.heartbeat_publish_interval(),
        )
        .await?;
        self.bb
            .set_pending(
                WorkerKind::Indexer,
                &worker_id,
                &task.url,
                task.depth,
                Some(&task.text_key),
            )
            .await?;

        let result = self.execute(&task).await;

        heartbeat.stop().await;
        self.bb.remove_heartbeat(WorkerKind::Indexer, &worker_id).await?;
        self.bb.delete_pending(WorkerKind::Indexer, &worker_id).await?;

        if let Err(e) = result {
            self.metrics.tasks_failed.inc();
            return Err(e);
        }
        self.bus.ack_index(&task.receipt_handle).await?;
        self.metrics.tasks_succeeded.inc();
        Ok(())
    }

    async fn execute(&self, task: &IndexTask) -> Result<()> {
        let content = self.artifacts.get_text(&task.text_key).await?;
        let tokens = tokenize_and_normalize(&content);
        self.search
            .index(IndexDocument {
                url: task.url.clone(),
                content,
                tokens,
                timestamp: chrono::Utc::now().timestamp(),
            })
            .await
    }
}
