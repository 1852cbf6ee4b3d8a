//! The crawl worker's per-task state machine: `Received -> RobotsCheck ->
//! (Disallowed | PolitenessWait -> Fetch -> (Error | Extract ->
//! PersistArtifacts -> EnqueueIndex -> PublishResult)) -> Ack` (spec.md
//! §4.2). Grounded in the teacher's `crawler/crawler.rs` consumer loop,
//! rebuilt against the Task Bus / Bulletin Board / Artifact Store clients
//! instead of an in-process frontier.

use crate::bb::{BulletinBoard, CrawlResultPayload, HeartbeatGuard, WorkerKind};
use crate::common::config::Config;
use crate::common::error::{Error, Result};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::Parser;
use crate::crawler::robots::RobotsChecker;
use crate::queue::{CrawlTask, TaskBus};
use crate::storage::ArtifactStore;
use prometheus::{IntCounter, Registry};
use tracing::{error, info, warn};
use url::Url;

/// Per-task counters exposed on the crawl worker's own `/metrics` endpoint.
pub struct WorkerMetrics {
    pub registry: Registry,
    pub tasks_succeeded: IntCounter,
    pub tasks_failed: IntCounter,
}

impl WorkerMetrics {
    fn new() -> Self {
        let registry = Registry::new();
        let tasks_succeeded =
            IntCounter::new("crawlfabric_crawl_tasks_succeeded_total", "Crawl tasks completed cleanly").unwrap();
        let tasks_failed =
            IntCounter::new("crawlfabric_crawl_tasks_failed_total", "Crawl tasks that hit a collaborator error").unwrap();
        registry.register(Box::new(tasks_succeeded.clone())).unwrap();
        registry.register(Box::new(tasks_failed.clone())).unwrap();
        Self { registry, tasks_succeeded, tasks_failed }
    }
}

#[derive(Clone)]
pub struct CrawlWorker {
    bus: TaskBus,
    bb: BulletinBoard,
    artifacts: ArtifactStore,
    fetcher: Fetcher,
    parser: Parser,
    robots: RobotsChecker,
    config: Config,
    metrics: std::sync::Arc<WorkerMetrics>,
}

impl CrawlWorker {
    pub fn new(
        bus: TaskBus,
        bb: BulletinBoard,
        artifacts: ArtifactStore,
        fetcher: Fetcher,
        robots: RobotsChecker,
        config: Config,
    ) -> Self {
        let parser = Parser::new(config.crawler.max_new_urls_per_result);
        Self {
            bus,
            bb,
            artifacts,
            fetcher,
            parser,
            robots,
            config,
            metrics: std::sync::Arc::new(WorkerMetrics::new()),
        }
    }

    /// Registry backing this worker's `/metrics` side app.
    pub fn metrics_registry(&self) -> Registry {
        self.metrics.registry.clone()
    }

    /// Long-poll `TaskBus` for `crawl_page` tasks until `shutdown` fires.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            let task = tokio::select! {
                received = self.bus.receive_crawl() => received,
                _ = shutdown.changed() => {
                    info!("crawl worker shutting down");
                    return;
                }
            };

            match task {
                Ok(Some(task)) => {
                    if let Err(e) = self.process(task).await {
                        error!(error = %e, "crawl task failed without clean completion");
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "failed to receive crawl task, retrying");
                }
            }
        }
    }

    async fn process(&self, task: CrawlTask) -> Result<()> {
        let worker_id = WorkerKind::Crawler.worker_id(&task.task_id);

        // Heartbeat must be written before the pending record (spec.md §5),
        // so a reaper never observes a pending assignment without one.
        let heartbeat = HeartbeatGuard::start(
            self.bb.clone(),
            WorkerKind::Crawler,
            worker_id.clone(),
            self.config.crawler.heartbeat_publish_interval(),
        )
        .await?;
        self.bb
            .set_pending(WorkerKind::Crawler, &worker_id, &task.url, task.depth, None)
            .await?;

        let outcome = self.execute(&task).await;

        heartbeat.stop().await;
        self.bb.remove_heartbeat(WorkerKind::Crawler, &worker_id).await?;
        self.bb.delete_pending(WorkerKind::Crawler, &worker_id).await?;

        match outcome {
            Ok(payload) => {
                let status = if payload.status == "error" { "error" } else { "done" };
                self.bb.mark_finished_crawl(&worker_id, status).await?;
                let json = serde_json::to_string(&payload)
                    .map_err(|e| Error::Unknown(e.to_string()))?;
                self.bb.set_crawl_result(&worker_id, &json).await?;
                self.bus.ack_crawl(&task.receipt_handle).await?;
                self.metrics.tasks_succeeded.inc();
                Ok(())
            }
            Err(e) => {
                let payload = CrawlResultPayload {
                    url: task.url.clone(),
                    status: "error".to_string(),
                    depth: task.depth,
                    new_urls: Vec::new(),
                    content_length: 0,
                    error: Some(e.to_string()),
                };
                self.bb.mark_finished_crawl(&worker_id, "error").await?;
                if let Ok(json) = serde_json::to_string(&payload) {
                    let _ = self.bb.set_crawl_result(&worker_id, &json).await;
                }
                self.metrics.tasks_failed.inc();
                // Not acked: TB redelivers after the visibility timeout.
                Err(e)
            }
        }
    }

    /// Run the RobotsCheck/PolitenessWait/Fetch/Extract/Persist/Enqueue
    /// chain. Policy denial and transient fetch failure are reported as
    /// `Ok` result payloads (clean completions, per spec.md §7); only
    /// unexpected collaborator failures (BB/AS/TB) return `Err`.
    async fn execute(&self, task: &CrawlTask) -> Result<CrawlResultPayload> {
        let url = Url::parse(&task.url)?;

        if !self.robots.is_allowed(&url).await? {
            return Ok(CrawlResultPayload {
                url: task.url.clone(),
                status: "disallowed".to_string(),
                depth: task.depth,
                new_urls: Vec::new(),
                content_length: 0,
                error: None,
            });
        }

        tokio::time::sleep(self.config.crawler.crawl_delay()).await;

        let response = match self.fetcher.fetch(&url).await {
            Ok(response) => response,
            Err(e) => {
                return Ok(CrawlResultPayload {
                    url: task.url.clone(),
                    status: "error".to_string(),
                    depth: task.depth,
                    new_urls: Vec::new(),
                    content_length: 0,
                    error: Some(e.to_string()),
                })
            }
        };

        let parsed = self.parser.parse(&response.body, &url)?;
        let host = url.host_str().unwrap_or("unknown").to_string();

        self.artifacts.put_html(&host, &task.url, &response.body).await?;
        let text_key = self.artifacts.put_text(&host, &task.url, &parsed.text_content).await?;

        self.bus.publish_index(&task.url, task.depth, &text_key).await?;

        let new_urls: Vec<String> = parsed.links.iter().map(|u| u.to_string()).collect();
        Ok(CrawlResultPayload {
            url: task.url.clone(),
            status: "success".to_string(),
            depth: task.depth,
            new_urls,
            content_length: response.body.len(),
            error: None,
        })
    }
}
