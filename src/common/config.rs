use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide configuration, loaded from defaults, an optional config file,
/// and environment variables (highest precedence), per spec.md §6.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub bulletin_board: BulletinBoardConfig,
    pub task_bus: TaskBusConfig,
    pub artifact_store: ArtifactStoreConfig,
    pub search: SearchConfig,
    pub api: ApiConfig,
    pub worker_metrics: WorkerMetricsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CrawlerConfig {
    /// Maximum crawl depth; URLs at a deeper level are never admitted.
    pub max_depth: usize,

    /// Request timeout in seconds for both page fetches and robots.txt fetches.
    pub timeout_seconds: u64,

    /// User agent string sent on every fetch and consulted against robots.txt.
    pub user_agent: String,

    /// Politeness delay applied unconditionally before every fetch.
    pub crawl_delay_ms: u64,

    /// Maximum retries a worker's own HTTP client attempts for a single fetch.
    pub max_retries: u32,

    /// Maximum page size read from a response body, in bytes.
    pub max_page_size: usize,

    /// TTL for a cached robots.txt verdict (including the allow-all fallback).
    pub robots_cache_ttl_secs: u64,

    /// Maximum number of discovered links carried in a single crawl result.
    pub max_new_urls_per_result: usize,

    /// Detection TTL: a worker with no heartbeat newer than this is dead.
    /// Split from the publish cadence to resolve the overloaded
    /// HEARTBEAT_INTERVAL noted in spec.md §9.
    pub heartbeat_detection_ttl_secs: u64,

    /// Heartbeat publish cadence; kept <= heartbeat_detection_ttl_secs / 3.
    pub heartbeat_publish_interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BulletinBoardConfig {
    pub redis_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TaskBusConfig {
    pub aws_region: String,
    pub crawler_queue_url: String,
    pub indexer_queue_url: String,
    /// Visibility timeout applied to both queues; long enough to absorb a
    /// stuck fetch without causing premature redelivery (spec.md §5).
    pub visibility_timeout_secs: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArtifactStoreConfig {
    pub aws_region: String,
    pub bucket: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Local path for the tantivy index directory.
    pub index_path: String,
    /// Retained for parity with the original OpenSearch-backed indexer;
    /// unused by the in-process tantivy SearchBackend (see DESIGN.md).
    pub opensearch_host: Option<String>,
    pub default_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Requests per minute accepted by the control-plane before 429s.
    pub rate_limit_per_minute: u32,
}

/// Ports for the crawl/index worker binaries' own `/metrics` + `/health`
/// side app, separate from the master's control-plane API.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkerMetricsConfig {
    pub crawl_worker_port: u16,
    pub index_worker_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            crawler: CrawlerConfig {
                max_depth: 1,
                timeout_seconds: 5,
                user_agent: "MyCustomBot/1.0".to_string(),
                crawl_delay_ms: 1000,
                max_retries: 3,
                max_page_size: 10 * 1024 * 1024,
                robots_cache_ttl_secs: 3600,
                max_new_urls_per_result: 5,
                heartbeat_detection_ttl_secs: 30,
                heartbeat_publish_interval_secs: 2,
            },
            bulletin_board: BulletinBoardConfig {
                redis_url: "redis://127.0.0.1:6379/0".to_string(),
            },
            task_bus: TaskBusConfig {
                aws_region: "eu-north-1".to_string(),
                crawler_queue_url: String::new(),
                indexer_queue_url: String::new(),
                visibility_timeout_secs: 3600,
            },
            artifact_store: ArtifactStoreConfig {
                aws_region: "eu-north-1".to_string(),
                bucket: String::new(),
            },
            search: SearchConfig {
                index_path: "./data/index".to_string(),
                opensearch_host: None,
                default_limit: 10,
            },
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 6000,
                enable_cors: true,
                rate_limit_per_minute: 100,
            },
            worker_metrics: WorkerMetricsConfig {
                crawl_worker_port: 9101,
                index_worker_port: 9102,
            },
        }
    }
}

impl CrawlerConfig {
    pub fn crawl_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_delay_ms)
    }

    pub fn robots_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_cache_ttl_secs)
    }

    pub fn heartbeat_detection_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_detection_ttl_secs)
    }

    pub fn heartbeat_publish_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_publish_interval_secs)
    }
}

impl Config {
    /// Load configuration layered as defaults -> `.env`/environment
    /// (highest precedence), matching spec.md §6's env-var table.
    pub fn load() -> crate::common::error::Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::Environment::with_prefix("CRAWLFABRIC").separator("__"));

        let settings = builder.build()?;
        let mut cfg: Config = settings.try_deserialize().unwrap_or(defaults);

        // spec.md §6 names a handful of bare (unprefixed) env vars directly;
        // honor those too, taking precedence over the CRAWLFABRIC__* form.
        if let Ok(v) = std::env::var("REDIS_URL") {
            cfg.bulletin_board.redis_url = v;
        }
        if let Ok(v) = std::env::var("AWS_REGION") {
            cfg.task_bus.aws_region = v.clone();
            cfg.artifact_store.aws_region = v;
        }
        if let Ok(v) = std::env::var("S3_BUCKET") {
            cfg.artifact_store.bucket = v;
        }
        if let Ok(v) = std::env::var("SQS_QUEUE_URL") {
            cfg.task_bus.crawler_queue_url = v;
        }
        if let Ok(v) = std::env::var("SQS_INDEXER_QUEUE_URL") {
            cfg.task_bus.indexer_queue_url = v;
        }
        if let Ok(v) = std::env::var("OPENSEARCH_HOST") {
            cfg.search.opensearch_host = Some(v);
        }
        if let Ok(v) = std::env::var("USER_AGENT") {
            cfg.crawler.user_agent = v;
        }
        if let Ok(v) = std::env::var("CRAWL_DELAY") {
            if let Ok(secs) = v.parse::<u64>() {
                cfg.crawler.crawl_delay_ms = secs * 1000;
            }
        }
        if let Ok(v) = std::env::var("MAX_RETRIES") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.crawler.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("HEARTBEAT_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                cfg.crawler.heartbeat_detection_ttl_secs = secs;
                cfg.crawler.heartbeat_publish_interval_secs = (secs / 3).max(1);
            }
        }
        if let Ok(v) = std::env::var("ROBOTS_CACHE_EXPIRE") {
            if let Ok(secs) = v.parse::<u64>() {
                cfg.crawler.robots_cache_ttl_secs = secs;
            }
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_satisfy_spec_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.crawler.max_new_urls_per_result, 5);
        assert_eq!(cfg.crawler.robots_cache_ttl_secs, 3600);
        assert_eq!(cfg.task_bus.visibility_timeout_secs, 3600);
        assert_eq!(cfg.crawler.crawl_delay_ms, 1000);
    }
}
