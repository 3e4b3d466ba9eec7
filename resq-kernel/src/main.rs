//! ResQ kernel - SOS report registry and relief-camp tracker.
//!
//! Boots the pieces in order: config, persisted registry, expiry sweeper, HTTP API.
//! Reports expire a few minutes after their last refresh; everything is written
//! through to a single JSON file.

mod camps;
mod config;
mod error;
mod http;
mod logging;
mod models;
mod notify;
mod registry;
mod store;
mod sweeper;

use crate::config::load_config;
use crate::http::AppState;
use crate::notify::LogSink;
use crate::registry::{Registry, SharedRegistry};
use crate::store::JsonStore;
use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();
    logging::init_logging();

    let cfg = load_config().await;

    let registry: SharedRegistry = Arc::new(Registry::open(JsonStore::new(&cfg.storage.data_file)));
    tracing::info!(active = registry.len(), camps = registry.list_camps().len(), "registry ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = sweeper::spawn_sweeper(registry.clone(), cfg.expiry, shutdown_rx);

    let app_state = AppState {
        registry,
        alerts: Arc::new(LogSink),
        alert_conf: cfg.alerts.clone(),
    };
    let app = http::build_router(app_state);

    let addr = cfg.http.socket_addr().context("invalid http listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await
        .context("http server failed")?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    Ok(())
}
