mod config;
mod control;
mod delivery;
mod error;
mod platform;
mod relay;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::control::RelayControl;
use crate::delivery::{EvolutionClient, TelegramDelivery};
use crate::relay::{DeduplicationStore, Destination, RelayEngine};
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,linkrelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Source group: {}", config.source.group_id);
    info!("  Destinations: {}", config.destinations.len());
    info!("  Rewrite rules: {}", config.rules.len());
    info!("  Webhook URL: {}", config.webhook_url());

    let evolution = Arc::new(EvolutionClient::new());

    let dedup = DeduplicationStore::new(config.relay.dedup_capacity);
    info!("  Dedup capacity: {} per source", dedup.capacity());

    let engine = RelayEngine::new(dedup)
        .with_delivery_timeout(config.delivery_timeout())
        .with_header(config.relay.header.clone())
        .with_adapter(Destination::WhatsApp, evolution.clone())
        .with_adapter(Destination::Telegram, Arc::new(TelegramDelivery::new()));

    let control = RelayControl::new(config.relay_config(), config.webhook_url());

    let state = AppState {
        engine: Arc::new(engine),
        control: Arc::new(control),
        registrar: evolution,
    };

    info!(
        "Relay is {}",
        if config.relay.active { "active" } else { "inactive (POST {\"action\":\"start\"} to /api/transfer)" }
    );
    server::serve(state, &config.server.bind).await?;

    Ok(())
}
