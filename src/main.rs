//! park-sync - entity synchronization and live data engine
//!
//! Runs one destination backed by a JSON fixture, polling its live data on
//! an interval and logging every notification the engine emits.
//!
//! Module structure:
//! - `domain/` - Core types (Entity, LiveDataRecord, content hash)
//! - `io/` - External interfaces (Cache, Notifier, fixture producer)
//! - `services/` - Engine logic (Destination, EntityAggregator, LiveDataSynchronizer)
//! - `infra/` - Infrastructure (Config, Metrics, SingleFlight)

use anyhow::Context;
use clap::Parser;
use park_sync::infra::Config;
use park_sync::io::{FixtureDestination, MemoryStore, Notification, ScopedCache};
use park_sync::services::Destination;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// park-sync - destination entity and live data synchronizer
#[derive(Parser, Debug)]
#[command(name = "park-sync", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single live data poll and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-update visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("park-sync starting");

    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path).apply_env_overrides(std::env::vars());
    config.validate().context("Invalid configuration")?;

    info!(
        config_file = %config.config_file(),
        destination_id = %config.destination_id(),
        timezone = %config.timezone(),
        cache_namespace = %config.cache_namespace(),
        cache_version = %config.cache_version(),
        fixture = %config.fixture_file(),
        poll_interval_secs = %config.poll_interval_secs(),
        "config_loaded"
    );

    let store = MemoryStore::new();
    let cache = Arc::new(ScopedCache::new(store.clone(), config.cache_namespace(), config.cache_version()));
    let producer = Arc::new(FixtureDestination::from_file(config.fixture_file()));

    let poll_interval = Duration::from_secs(config.poll_interval_secs().max(1));
    let poll_timeout = config.poll_timeout();
    let metrics_interval = Duration::from_secs(config.metrics_interval_secs().max(1));

    let destination = Arc::new(Destination::new(config, producer, cache).context("Failed to create destination")?);

    // Log notifications off the update path
    let (_listener, mut notifications) = destination
        .forward_to_channel(1000)
        .context("Failed to attach notification logger")?;
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match &notification {
                Notification::LiveUpdate { entity_id, data } => {
                    info!(entity_id = %entity_id, status = ?data.get("status"), "liveupdate");
                }
                Notification::Error { entity_id, kind, .. } => {
                    warn!(entity_id = %entity_id, kind = %kind.as_str(), "livedata_error");
                }
            }
        }
    });

    let entities = destination.get_all_entities().await.context("Failed to build entity graph")?;
    info!(entities = %entities.len(), "entity_graph_ready");

    if args.once {
        poll(&destination, poll_timeout).await;
        destination.metrics().summary().log();
        info!("park-sync single poll complete");
        return Ok(());
    }

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Metrics reporter (lock-free reads)
    let reporter = destination.clone();
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(metrics_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    reporter.metrics().summary().log();
                    store.purge_expired();
                }
                _ = reporter_shutdown.changed() => break,
            }
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let mut interval = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => poll(&destination, poll_timeout).await,
            _ = shutdown_rx.changed() => break,
        }
    }

    destination.metrics().summary().log();
    info!("park-sync shutdown complete");
    Ok(())
}

/// One live data poll, bounded by `timeout`
async fn poll(destination: &Destination, timeout: Duration) {
    match tokio::time::timeout(timeout, destination.get_entity_live_data()).await {
        Ok(Ok(batch)) => info!(records = %batch.len(), "livedata_polled"),
        Ok(Err(e)) => error!(error = %e, "livedata_poll_failed"),
        Err(_) => warn!(timeout_secs = %timeout.as_secs(), "livedata_poll_timeout"),
    }
}
