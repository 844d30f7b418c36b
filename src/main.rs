use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opml2json::config::Config;
use opml2json::server::{self, AppState, PageLimits};
use opml2json::service::TimelineService;

#[derive(Parser, Debug)]
#[command(
    name = "opml2json",
    version,
    about = "Serve an OPML subscription list as one paginated JSON timeline"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "opml2json.toml")]
    config: PathBuf,

    /// Listen address, overriding the config file
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,opml2json=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from '{}'", args.config.display()))?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    if config.allow_private_hosts {
        tracing::warn!("allow_private_hosts is enabled: feeds may target local networks");
    }

    let timeline = TimelineService::from_config(&config).context("Failed to build HTTP client")?;
    let state = AppState::new(timeline, PageLimits::from_config(&config));
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!(
        addr = %config.listen_addr,
        cache_ttl_secs = config.cache_ttl_secs,
        fetch_concurrency = config.fetch_concurrency,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
