//! offline-loader server entry point.
//!
//! This is the main binary that serves the viewer and the capture endpoint
//! over HTTP. Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::Result;
use loader_client::{CaptureService, Renderer};
use loader_core::{AppConfig, SnapshotStore};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod routes;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let addr = config.listen_addr()?;

    let store = SnapshotStore::open(&config.storage_root).await?;
    let service = CaptureService::from_config(&config, store, renderer(&config));
    let app = handler::router(handler::AppState::new(service));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, storage_root = %config.storage_root.display(), "offline-loader listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("offline-loader stopped");
    Ok(())
}

#[cfg(feature = "render")]
fn renderer(config: &AppConfig) -> Arc<dyn Renderer> {
    use loader_client::{ChromeConfig, HeadlessRenderer};
    Arc::new(HeadlessRenderer::new(ChromeConfig::from_config(config)))
}

#[cfg(not(feature = "render"))]
fn renderer(_config: &AppConfig) -> Arc<dyn Renderer> {
    tracing::warn!("built without the render feature; every cache miss will fail");
    Arc::new(loader_client::DisabledRenderer)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
