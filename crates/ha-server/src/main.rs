//! Home Assistant Rust Server
//!
//! Hosts the emonTx configuration integration: loads `configuration.yaml`,
//! sets up stored config entries and serves the REST API and panel assets.

mod api;
mod config;
mod hub;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::LoggerConfig;
use crate::hub::HomeAssistant;

/// Config directory: first argument, then `HASS_CONFIG`, then the cwd
fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HASS_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `RUST_LOG` wins over the `logger:` section
fn init_tracing(logger: &LoggerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logger.filter_directives()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = config_dir();
    let config = config::load(&config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;
    init_tracing(&config.logger)?;

    info!("Starting Home Assistant (Rust) from {}", config_dir.display());

    let hass = Arc::new(HomeAssistant::new(&config_dir));
    hass.start(config.emontx_config.clone()).await?;

    let addr = config.http.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("API server listening on {}", addr);

    axum::serve(listener, api::create_router(hass.clone()))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
            }
            info!("Shutting down...");
        })
        .await?;

    hass.stop().await;
    Ok(())
}
