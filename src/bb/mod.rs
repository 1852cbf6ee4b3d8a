//! Client for the Shared Bulletin Board (BB): the external key/value service
//! used as a rendezvous between the master and the worker pool. Ordered sets
//! track heartbeats, hash maps track in-flight assignments and finished-task
//! notifications, and plain keys hold per-task result blobs.
//!
//! Backed by Redis, matching spec.md §6's `REDIS_URL` configuration and the
//! original implementation's `redis_clinet.py`.

mod heartbeat;

pub use heartbeat::HeartbeatGuard;

use crate::common::error::Result;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Payload stored at `crawl_result:<worker_id>`: the crawl worker's report
/// back to the master, folded into the frontier by `monitor_finished_tasks`
/// (spec.md §4.1/§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResultPayload {
    pub url: String,
    pub status: String,
    pub depth: usize,
    pub new_urls: Vec<String>,
    pub content_length: usize,
    #[serde(default)]
    pub error: Option<String>,
}

/// A recovered in-flight assignment, read back from `pending_urls_to_*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAssignment {
    pub url: String,
    pub depth: usize,
    pub text_key: Option<String>,
}

/// The two task kinds that share the heartbeat/pending/finished mechanism,
/// parameterizing it generically rather than modeling crawler/indexer as
/// subclasses (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Crawler,
    Indexer,
}

impl WorkerKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            WorkerKind::Crawler => "crawler",
            WorkerKind::Indexer => "indexer",
        }
    }

    fn heartbeat_key(&self) -> &'static str {
        match self {
            WorkerKind::Crawler => "active_crawlers",
            WorkerKind::Indexer => "active_indexers",
        }
    }

    fn pending_key(&self) -> &'static str {
        match self {
            WorkerKind::Crawler => "pending_urls_to_crawl",
            WorkerKind::Indexer => "pending_urls_to_index",
        }
    }

    /// A worker identity is per-task: `"<kind>_<task_id>"` (spec.md §3).
    pub fn worker_id(&self, task_id: &str) -> String {
        format!("{}_{}", self.prefix(), task_id)
    }
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[derive(Clone)]
pub struct BulletinBoard {
    conn: ConnectionManager,
}

impl BulletinBoard {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_tokio_connection_manager().await?;
        Ok(Self { conn })
    }

    /// Write (or refresh) a worker's heartbeat score to the current time.
    pub async fn heartbeat(&self, kind: WorkerKind, worker_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(kind.heartbeat_key(), worker_id, now_unix())
            .await?;
        Ok(())
    }

    /// Remove a worker's heartbeat entry entirely (on clean task completion
    /// or after a dead worker has been reaped).
    pub async fn remove_heartbeat(&self, kind: WorkerKind, worker_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zrem(kind.heartbeat_key(), worker_id).await?;
        Ok(())
    }

    /// Worker ids whose heartbeat is older than `ttl` — candidates for
    /// `handle_crawler_failure` / `handle_indexer_failure`.
    pub async fn stale_workers(
        &self,
        kind: WorkerKind,
        ttl: std::time::Duration,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let cutoff = now_unix() - ttl.as_secs_f64();
        let ids: Vec<String> = conn
            .zrangebyscore(kind.heartbeat_key(), f64::NEG_INFINITY, cutoff)
            .await?;
        Ok(ids)
    }

    /// Worker ids whose heartbeat is fresh — used by the control-plane
    /// `/state` endpoint.
    pub async fn live_workers(
        &self,
        kind: WorkerKind,
        ttl: std::time::Duration,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let cutoff = now_unix() - ttl.as_secs_f64();
        let ids: Vec<String> = conn
            .zrangebyscore(kind.heartbeat_key(), cutoff, f64::INFINITY)
            .await?;
        Ok(ids)
    }

    /// Record the in-flight assignment for a worker so a reaper can recover
    /// it if the worker dies before acking. `text_key` is only meaningful
    /// for indexer tasks (the artifact key of the text being indexed).
    pub async fn set_pending(
        &self,
        kind: WorkerKind,
        worker_id: &str,
        url: &str,
        depth: usize,
        text_key: Option<&str>,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let value = format!("{}|{}|{}", url, depth, text_key.unwrap_or(""));
        let _: () = conn.hset(kind.pending_key(), worker_id, value).await?;
        Ok(())
    }

    /// Fetch and parse a pending assignment. A malformed or missing depth
    /// defaults to 1, matching the original's tolerant `handle_crawler_failure`
    /// decoding. An empty `text_key` segment is reported as `None`.
    pub async fn get_pending(
        &self,
        kind: WorkerKind,
        worker_id: &str,
    ) -> Result<Option<PendingAssignment>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(kind.pending_key(), worker_id).await?;
        Ok(raw.map(|entry| {
            let mut parts = entry.splitn(3, '|');
            let url = parts.next().unwrap_or_default().to_string();
            let depth = parts.next().and_then(|d| d.parse::<usize>().ok()).unwrap_or(1);
            let text_key = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
            PendingAssignment { url, depth, text_key }
        }))
    }

    pub async fn delete_pending(&self, kind: WorkerKind, worker_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(kind.pending_key(), worker_id).await?;
        Ok(())
    }

    /// All entries of `finished_crawls`: `worker_id -> status`.
    pub async fn finished_crawls(&self) -> Result<Vec<(String, String)>> {
        let mut conn = self.conn.clone();
        let map: std::collections::HashMap<String, String> =
            conn.hgetall("finished_crawls").await?;
        Ok(map.into_iter().collect())
    }

    pub async fn mark_finished_crawl(&self, worker_id: &str, status: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset("finished_crawls", worker_id, status).await?;
        Ok(())
    }

    pub async fn delete_finished_crawl(&self, worker_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel("finished_crawls", worker_id).await?;
        Ok(())
    }

    pub async fn set_crawl_result(&self, worker_id: &str, json: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(format!("crawl_result:{}", worker_id), json).await?;
        Ok(())
    }

    pub async fn get_crawl_result(&self, worker_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(format!("crawl_result:{}", worker_id)).await?;
        Ok(raw)
    }

    pub async fn delete_crawl_result(&self, worker_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(format!("crawl_result:{}", worker_id)).await?;
        Ok(())
    }
}
