use clap::Parser as ClapParser;
use crawlfabric::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(ClapParser, Debug)]
#[clap(author, version, about = "Master: frontier, dispatch, reap, control-plane API")]
struct Args {
    /// Override the control-plane API port from config.
    #[clap(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawlfabric=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load()?;
    if let Some(port) = args.port {
        config.api.port = port;
    }

    let master = Master::connect(config).await?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    master.run(shutdown_rx).await?;
    Ok(())
}
