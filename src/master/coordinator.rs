//! The master's background loop: dispatch queued URLs to the Task Bus, reap
//! dead workers, and fold finished crawls back into the frontier. Grounded
//! in `master_service.py`'s `distribute_tasks` / `monitor_workers` /
//! `monitor_finished_tasks`, which the original ran as three independent
//! threads; here they run as one sequential tick inside a single task so the
//! frontier mutex is never contended across them (spec.md §5).

use crate::bb::{BulletinBoard, CrawlResultPayload, PendingAssignment, WorkerKind};
use crate::common::config::Config;
use crate::common::error::Result;
use crate::master::frontier::Frontier;
use crate::queue::TaskBus;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// The subset of `BulletinBoard` the coordinator loop touches, narrowed to a
/// trait so `monitor_workers`/`monitor_finished_tasks` can run against an
/// in-memory fake in tests without live Redis.
#[async_trait]
pub trait CoordinatorBoard {
    async fn stale_workers(&self, kind: WorkerKind, ttl: std::time::Duration) -> Result<Vec<String>>;
    async fn get_pending(&self, kind: WorkerKind, worker_id: &str) -> Result<Option<PendingAssignment>>;
    async fn delete_pending(&self, kind: WorkerKind, worker_id: &str) -> Result<()>;
    async fn remove_heartbeat(&self, kind: WorkerKind, worker_id: &str) -> Result<()>;
    async fn finished_crawls(&self) -> Result<Vec<(String, String)>>;
    async fn get_crawl_result(&self, worker_id: &str) -> Result<Option<String>>;
    async fn delete_crawl_result(&self, worker_id: &str) -> Result<()>;
    async fn delete_finished_crawl(&self, worker_id: &str) -> Result<()>;
}

#[async_trait]
impl CoordinatorBoard for BulletinBoard {
    async fn stale_workers(&self, kind: WorkerKind, ttl: std::time::Duration) -> Result<Vec<String>> {
        BulletinBoard::stale_workers(self, kind, ttl).await
    }
    async fn get_pending(&self, kind: WorkerKind, worker_id: &str) -> Result<Option<PendingAssignment>> {
        BulletinBoard::get_pending(self, kind, worker_id).await
    }
    async fn delete_pending(&self, kind: WorkerKind, worker_id: &str) -> Result<()> {
        BulletinBoard::delete_pending(self, kind, worker_id).await
    }
    async fn remove_heartbeat(&self, kind: WorkerKind, worker_id: &str) -> Result<()> {
        BulletinBoard::remove_heartbeat(self, kind, worker_id).await
    }
    async fn finished_crawls(&self) -> Result<Vec<(String, String)>> {
        BulletinBoard::finished_crawls(self).await
    }
    async fn get_crawl_result(&self, worker_id: &str) -> Result<Option<String>> {
        BulletinBoard::get_crawl_result(self, worker_id).await
    }
    async fn delete_crawl_result(&self, worker_id: &str) -> Result<()> {
        BulletinBoard::delete_crawl_result(self, worker_id).await
    }
    async fn delete_finished_crawl(&self, worker_id: &str) -> Result<()> {
        BulletinBoard::delete_finished_crawl(self, worker_id).await
    }
}

/// The subset of `TaskBus` the dispatch loop touches.
#[async_trait]
pub trait CoordinatorBus {
    async fn publish_crawl(&self, url: &str, depth: usize) -> Result<String>;
}

#[async_trait]
impl CoordinatorBus for TaskBus {
    async fn publish_crawl(&self, url: &str, depth: usize) -> Result<String> {
        TaskBus::publish_crawl(self, url, depth).await
    }
}

/// Pop every queued URL and publish a `crawl_page` task for it. A publish
/// failure puts the URL back at its original depth and stops the round —
/// the next tick will retry it (spec.md §4.1 invariant: a URL is marked
/// crawled only after its task is durably on the bus).
pub async fn distribute_tasks<B: CoordinatorBus>(frontier: &Mutex<Frontier>, bus: &B) {
    loop {
        let next = {
            let mut f = frontier.lock().await;
            f.pop()
        };
        let Some((url, depth)) = next else {
            return;
        };
        match bus.publish_crawl(&url, depth).await {
            Ok(task_id) => {
                let mut f = frontier.lock().await;
                f.mark_crawled(&url);
                debug!(%url, %task_id, "dispatched crawl task");
            }
            Err(e) => {
                warn!(%url, error = %e, "failed to publish crawl task, requeueing");
                let mut f = frontier.lock().await;
                f.reinsert(url, depth);
                return;
            }
        }
    }
}

/// Recover the in-flight assignment of any worker whose heartbeat has gone
/// stale. Crawler failures reinject the URL into the frontier. Indexer
/// failures do not: the URL is already in `crawled_urls`, and a durable
/// index re-delivery must come from TB's own visibility-timeout redelivery
/// (spec.md §4.1) — the master only clears the indexer's bookkeeping here.
pub async fn monitor_workers<B: CoordinatorBoard>(
    bb: &B,
    frontier: &Mutex<Frontier>,
    kind: WorkerKind,
    ttl: std::time::Duration,
) {
    let stale = match bb.stale_workers(kind, ttl).await {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "failed to list stale workers");
            return;
        }
    };

    for worker_id in stale {
        let pending = match bb.get_pending(kind, &worker_id).await {
            Ok(p) => p,
            Err(e) => {
                error!(%worker_id, error = %e, "failed to read pending assignment");
                continue;
            }
        };

        if let Some(assignment) = pending {
            match kind {
                WorkerKind::Crawler => {
                    let mut f = frontier.lock().await;
                    f.reinsert(assignment.url.clone(), assignment.depth);
                    info!(%worker_id, url = %assignment.url, "reinjected crawl task from dead worker");
                }
                WorkerKind::Indexer => {
                    info!(%worker_id, url = %assignment.url, "dead indexer's task left to TB redelivery");
                }
            }
        }

        if let Err(e) = bb.delete_pending(kind, &worker_id).await {
            error!(%worker_id, error = %e, "failed to clear pending assignment");
        }
        if let Err(e) = bb.remove_heartbeat(kind, &worker_id).await {
            error!(%worker_id, error = %e, "failed to clear heartbeat");
        }
    }
}

/// Fold every completed crawl's discovered links back into the frontier,
/// then clean up its bookkeeping. A crawl that reported failure still has
/// its bookkeeping cleared, but contributes no new URLs.
pub async fn monitor_finished_tasks<B: CoordinatorBoard>(bb: &B, frontier: &Mutex<Frontier>) {
    let finished = match bb.finished_crawls().await {
        Ok(f) => f,
        Err(e) => {
            error!(error = %e, "failed to list finished crawls");
            return;
        }
    };

    for (worker_id, status) in finished {
        if status == "success" {
            match bb.get_crawl_result(&worker_id).await {
                Ok(Some(raw)) => match serde_json::from_str::<CrawlResultPayload>(&raw) {
                    Ok(result) => {
                        let mut f = frontier.lock().await;
                        let admitted = f.add_new_urls(&result.new_urls, result.depth);
                        drop(f);
                        debug!(%worker_id, admitted, "folded crawl result into frontier");
                    }
                    Err(e) => error!(%worker_id, error = %e, "malformed crawl result payload"),
                },
                Ok(None) => warn!(%worker_id, "finished crawl has no stored result"),
                Err(e) => error!(%worker_id, error = %e, "failed to read crawl result"),
            }
        }

        if let Err(e) = bb.delete_crawl_result(&worker_id).await {
            error!(%worker_id, error = %e, "failed to delete crawl result");
        }
        if let Err(e) = bb.delete_finished_crawl(&worker_id).await {
            error!(%worker_id, error = %e, "failed to delete finished-crawl marker");
        }
    }
}

/// Run dispatch -> reap -> fold on a 1s tick until `shutdown` fires.
pub async fn run(
    frontier: Arc<Mutex<Frontier>>,
    bb: BulletinBoard,
    bus: TaskBus,
    config: Config,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                distribute_tasks(&frontier, &bus).await;
                monitor_workers(
                    &bb,
                    &frontier,
                    WorkerKind::Crawler,
                    config.crawler.heartbeat_detection_ttl(),
                )
                .await;
                monitor_workers(
                    &bb,
                    &frontier,
                    WorkerKind::Indexer,
                    config.crawler.heartbeat_detection_ttl(),
                )
                .await;
                monitor_finished_tasks(&bb, &frontier).await;
            }
            _ = shutdown.changed() => {
                info!("coordinator loop shutting down");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// In-memory stand-in for the BB, holding only what `monitor_workers` /
    /// `monitor_finished_tasks` read and mutate.
    #[derive(Default)]
    struct FakeBoard {
        stale: StdMutex<HashMap<WorkerKind, Vec<String>>>,
        pending: StdMutex<HashMap<(WorkerKind, String), PendingAssignment>>,
        finished: StdMutex<Vec<(String, String)>>,
        crawl_results: StdMutex<HashMap<String, String>>,
        deleted_pending: StdMutex<Vec<(WorkerKind, String)>>,
        deleted_heartbeats: StdMutex<Vec<(WorkerKind, String)>>,
        deleted_crawl_results: StdMutex<Vec<String>>,
        deleted_finished: StdMutex<Vec<String>>,
    }

    impl FakeBoard {
        fn with_stale_crawler(worker_id: &str, url: &str, depth: usize) -> Self {
            let board = Self::default();
            board
                .stale
                .lock()
                .unwrap()
                .insert(WorkerKind::Crawler, vec![worker_id.to_string()]);
            board.pending.lock().unwrap().insert(
                (WorkerKind::Crawler, worker_id.to_string()),
                PendingAssignment {
                    url: url.to_string(),
                    depth,
                    text_key: None,
                },
            );
            board
        }

        fn with_stale_indexer(worker_id: &str, url: &str, depth: usize) -> Self {
            let board = Self::default();
            board
                .stale
                .lock()
                .unwrap()
                .insert(WorkerKind::Indexer, vec![worker_id.to_string()]);
            board.pending.lock().unwrap().insert(
                (WorkerKind::Indexer, worker_id.to_string()),
                PendingAssignment {
                    url: url.to_string(),
                    depth,
                    text_key: Some("crawled/a.test/x.txt".to_string()),
                },
            );
            board
        }

        fn with_finished_success(worker_id: &str, result: CrawlResultPayload) -> Self {
            let board = Self::default();
            board
                .finished
                .lock()
                .unwrap()
                .push((worker_id.to_string(), "success".to_string()));
            board
                .crawl_results
                .lock()
                .unwrap()
                .insert(worker_id.to_string(), serde_json::to_string(&result).unwrap());
            board
        }
    }

    #[async_trait]
    impl CoordinatorBoard for FakeBoard {
        async fn stale_workers(&self, kind: WorkerKind, _ttl: std::time::Duration) -> Result<Vec<String>> {
            Ok(self.stale.lock().unwrap().get(&kind).cloned().unwrap_or_default())
        }
        async fn get_pending(&self, kind: WorkerKind, worker_id: &str) -> Result<Option<PendingAssignment>> {
            Ok(self.pending.lock().unwrap().get(&(kind, worker_id.to_string())).cloned())
        }
        async fn delete_pending(&self, kind: WorkerKind, worker_id: &str) -> Result<()> {
            self.deleted_pending.lock().unwrap().push((kind, worker_id.to_string()));
            Ok(())
        }
        async fn remove_heartbeat(&self, kind: WorkerKind, worker_id: &str) -> Result<()> {
            self.deleted_heartbeats.lock().unwrap().push((kind, worker_id.to_string()));
            Ok(())
        }
        async fn finished_crawls(&self) -> Result<Vec<(String, String)>> {
            Ok(self.finished.lock().unwrap().clone())
        }
        async fn get_crawl_result(&self, worker_id: &str) -> Result<Option<String>> {
            Ok(self.crawl_results.lock().unwrap().get(worker_id).cloned())
        }
        async fn delete_crawl_result(&self, worker_id: &str) -> Result<()> {
            self.deleted_crawl_results.lock().unwrap().push(worker_id.to_string());
            Ok(())
        }
        async fn delete_finished_crawl(&self, worker_id: &str) -> Result<()> {
            self.deleted_finished.lock().unwrap().push(worker_id.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn dead_crawler_reinjects_its_pending_url_into_the_frontier() {
        let bb = FakeBoard::with_stale_crawler("crawler_abc", "https://a.test/page", 2);
        let frontier = Mutex::new(Frontier::new());

        monitor_workers(&bb, &frontier, WorkerKind::Crawler, std::time::Duration::from_secs(30)).await;

        let f = frontier.lock().await;
        assert_eq!(f.queued_urls(), vec!["https://a.test/page".to_string()]);
        drop(f);
        assert_eq!(bb.deleted_pending.lock().unwrap().len(), 1);
        assert_eq!(bb.deleted_heartbeats.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dead_indexer_leaves_the_frontier_untouched() {
        // spec.md §4.1: indexer failures do not reinject — the URL is already
        // in `crawled_urls`, and redelivery is TB's job, not the master's.
        let bb = FakeBoard::with_stale_indexer("indexer_xyz", "https://a.test/page", 1);
        let frontier = Mutex::new(Frontier::new());

        monitor_workers(&bb, &frontier, WorkerKind::Indexer, std::time::Duration::from_secs(30)).await;

        let f = frontier.lock().await;
        assert!(f.is_empty());
        drop(f);
        assert_eq!(bb.deleted_pending.lock().unwrap(), vec![(WorkerKind::Indexer, "indexer_xyz".to_string())]);
        assert_eq!(bb.deleted_heartbeats.lock().unwrap(), vec![(WorkerKind::Indexer, "indexer_xyz".to_string())]);
    }

    #[tokio::test]
    async fn finished_success_folds_new_urls_into_the_frontier() {
        let bb = FakeBoard::with_finished_success(
            "crawler_abc",
            CrawlResultPayload {
                url: "https://a.test/".to_string(),
                status: "success".to_string(),
                depth: 1,
                new_urls: vec!["https://a.test/child".to_string()],
                content_length: 100,
                error: None,
            },
        );
        let frontier = Mutex::new(Frontier::new());
        frontier.lock().await.set_crawl_options(2, None);

        monitor_finished_tasks(&bb, &frontier).await;

        let f = frontier.lock().await;
        assert_eq!(f.queued_urls(), vec!["https://a.test/child".to_string()]);
        drop(f);
        assert_eq!(bb.deleted_crawl_results.lock().unwrap(), vec!["crawler_abc".to_string()]);
        assert_eq!(bb.deleted_finished.lock().unwrap(), vec!["crawler_abc".to_string()]);
    }

    #[tokio::test]
    async fn finished_failure_clears_bookkeeping_without_folding_urls() {
        let bb = FakeBoard::default();
        bb.finished.lock().unwrap().push(("crawler_def".to_string(), "failure".to_string()));
        let frontier = Mutex::new(Frontier::new());
        frontier.lock().await.set_crawl_options(2, None);

        monitor_finished_tasks(&bb, &frontier).await;

        let f = frontier.lock().await;
        assert!(f.is_empty());
        drop(f);
        assert_eq!(bb.deleted_finished.lock().unwrap(), vec!["crawler_def".to_string()]);
    }

    #[tokio::test]
    async fn distribute_tasks_marks_each_popped_url_crawled() {
        struct FakeBus;
        #[async_trait]
        impl CoordinatorBus for FakeBus {
            async fn publish_crawl(&self, _url: &str, _depth: usize) -> Result<String> {
                Ok("msg-1".to_string())
            }
        }

        let frontier = Mutex::new(Frontier::new());
        frontier.lock().await.add_seed_urls(&["https://a.test/".to_string()]);

        distribute_tasks(&frontier, &FakeBus).await;

        let f = frontier.lock().await;
        assert!(f.is_empty());
        assert_eq!(f.crawled_urls(), vec!["https://a.test/".to_string()]);
    }
}
