use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use yt_relay::config::RelayConfig;
use yt_relay::downloader::{SystemRunner, ToolLocator};
use yt_relay::server::{router, AppState};
use yt_relay::store::TempStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,yt_relay=info")),
        )
        .init();

    let config = RelayConfig::parse()?;

    let store = TempStore::new(&config.work_dir)
        .with_context(|| format!("initializing artifact store at {}", config.work_dir.display()))?;
    let tools = ToolLocator::new(config.pinned_tool.clone());
    match tools.version() {
        Some(version) => info!(%version, "yt-dlp resolved"),
        None => tracing::warn!(
            "yt-dlp not found; downloads will fail until it is installed"
        ),
    }

    let state = AppState {
        store: Arc::new(store),
        runner: Arc::new(SystemRunner),
        tools: Arc::new(tools),
    };

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(listen = %config.listen, work_dir = %config.work_dir.display(), "relay listening");

    axum::serve(listener, router(state))
        .await
        .context("serving HTTP")?;

    Ok(())
}
