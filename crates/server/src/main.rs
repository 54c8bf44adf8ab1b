//! imgdup server entry point.
//!
//! Serves the duplicate-image WebSocket protocol on `/` and a liveness check on `/health`.
//! Logs are JSON on stderr.

use anyhow::{Context, Result};
use imgdup_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod actions;
mod error;
mod handler;
mod outbound;
mod pipeline;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let bind_addr = config.bind_addr.clone();
    tracing::info!(
        bind_addr = %bind_addr,
        cache_dir = %config.cache_dir.display(),
        staging_dir = %config.staging_dir.display(),
        fetch_concurrency = config.fetch_concurrency,
        "starting imgdup server"
    );

    let state = AppState::from_config(config)
        .await
        .context("failed to initialise application state")?;

    let app = handler::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
