//! Query Cache - host process
//!
//! Builds a cache from the environment, runs the purge driver and logs a
//! telemetry snapshot on a fixed interval until asked to stop.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_cache::{spawn_purge_task, Config, QueryCache};

/// Main entry point for the query cache host.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache with the configured budget and shards
/// 4. Start the background purge driver
/// 5. Log counters every `stats_interval` until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting query cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_memory_size={}, shards={}, purge_loop={}ms, purge_total={}ms, thresholds={}%..{}%",
        config.max_memory_size,
        config.shard_count,
        config.purge_loop_time.as_millis(),
        config.purge_total_time.as_millis(),
        config.purge_threshold_pct_min,
        config.purge_threshold_pct_max
    );

    let stats_interval = config.stats_interval;
    anyhow::ensure!(
        !stats_interval.is_zero(),
        "QC_STATS_INTERVAL_SECS must be positive"
    );
    let cache = Arc::new(QueryCache::new(config).context("invalid cache configuration")?);
    info!("Query cache initialized");

    let purge = spawn_purge_task(cache.clone()).context("starting purge thread")?;
    info!("Background purge thread started");

    let mut ticker = tokio::time::interval(stats_interval);
    // The first tick completes immediately
    ticker.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = cache.stats();
                info!(
                    "Stats: {}",
                    serde_json::to_string(&stats).context("serializing stats")?
                );
            }
            _ = &mut shutdown => break,
        }
    }

    // Joining waits out any pass in progress; keep it off the async workers
    tokio::task::spawn_blocking(move || purge.shutdown())
        .await
        .context("joining purge thread")?;

    let cleared = cache.flush();
    info!("Flushed {} live entries, shutdown complete", cleared);
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
