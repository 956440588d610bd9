mod bootstrap;
mod dashboard;
mod handler;
mod health;
mod intake;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mission_control_core::config::{AppConfig, LoadOptions};
use mission_control_core::ExpiringMap;
use mission_control_slack::EventDeduplicator;
use tokio::net::TcpListener;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn init_logging(config: &AppConfig) {
    use mission_control_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the config, so load it before anything else.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    spawn_sweeper(Arc::clone(&app.dedup), Arc::clone(&app.cache));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        modules = ?app.registry.module_names(),
        "mission control server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, app.router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        in_flight = app.in_flight.count(),
        grace_secs = grace.as_secs(),
        "mission control server stopping"
    );
    let abandoned = app.in_flight.drain(grace).await;
    if abandoned > 0 {
        tracing::warn!(
            event_name = "system.server.handlers_abandoned",
            correlation_id = "shutdown",
            abandoned,
            "event handlers still running at shutdown"
        );
    }

    Ok(())
}

/// Periodically drops expired dedup keys and cached responses.
fn spawn_sweeper(dedup: Arc<EventDeduplicator>, cache: Arc<ExpiringMap<String, serde_json::Value>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let dedup_removed = dedup.sweep();
            let cache_removed = cache.sweep();
            if dedup_removed + cache_removed > 0 {
                tracing::debug!(
                    event_name = "system.sweeper.swept",
                    dedup_removed,
                    cache_removed,
                    "expired entries removed"
                );
            }
        }
    });
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(event_name = "system.server.signal_error", error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
