use crawlfabric::common::config::Config;
use crawlfabric::crawler::{CrawlWorker, Fetcher, RobotsChecker};
use crawlfabric::{bb::BulletinBoard, queue::TaskBus, storage::ArtifactStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawlfabric=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    let bb = BulletinBoard::connect(&config.bulletin_board.redis_url).await?;
    let bus = TaskBus::connect(
        &config.task_bus.aws_region,
        config.task_bus.crawler_queue_url.clone(),
        config.task_bus.indexer_queue_url.clone(),
        config.task_bus.visibility_timeout_secs,
    )
    .await;
    let artifacts =
        ArtifactStore::connect(&config.artifact_store.aws_region, config.artifact_store.bucket.clone())
            .await;
    let fetcher = Fetcher::new(
        &config.crawler.user_agent,
        config.crawler.timeout_seconds,
        config.crawler.max_page_size,
    )?;
    let robots = RobotsChecker::new(
        config.crawler.user_agent.clone(),
        config.crawler.robots_cache_ttl(),
        fetcher.clone(),
    );

    let worker = CrawlWorker::new(bus, bb, artifacts, fetcher, robots, config.clone());

    let metrics_addr: std::net::SocketAddr =
        format!("0.0.0.0:{}", config.worker_metrics.crawl_worker_port).parse()?;
    tokio::spawn(crawlfabric::common::metrics_server::serve(
        worker.metrics_registry(),
        metrics_addr,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;
    Ok(())
}
