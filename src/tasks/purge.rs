//! Purge Driver Thread
//!
//! Dedicated background thread that wakes on the configured interval,
//! refreshes the cache's cached time and sweeps one chunk of every shard.
//! Sweeps take blocking shard locks, so they never run on an async worker.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::error::{CacheError, Result};

/// Name of the purge driver thread.
pub const PURGE_THREAD_NAME: &str = "qc-purge";

/// Handle to a running purge driver.
#[derive(Debug)]
pub struct PurgeHandle {
    shutdown: watch::Sender<bool>,
    thread: JoinHandle<()>,
}

impl PurgeHandle {
    /// Signals the driver to stop and waits for the thread to exit.
    ///
    /// A pass already in progress runs to completion first. Blocks the
    /// caller; from async code run it through `spawn_blocking`.
    pub fn shutdown(self) {
        // The receiver is gone only if the thread already exited
        let _ = self.shutdown.send(true);
        self.thread.thread().unpark();
        if self.thread.join().is_err() {
            warn!("Purge thread panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Spawns the background purge driver for `cache` on its own thread.
///
/// The thread sleeps for `purge_loop_time` between wakes and stops once the
/// returned handle signals shutdown or is dropped. Each wake runs one
/// [`QueryCache::purge_pass`].
///
/// # Example
/// ```ignore
/// let cache = Arc::new(QueryCache::new(Config::with_max_memory(1 << 20))?);
/// let purge = spawn_purge_task(cache.clone())?;
/// // Later, during shutdown:
/// purge.shutdown();
/// ```
pub fn spawn_purge_task(cache: Arc<QueryCache>) -> Result<PurgeHandle> {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let interval = cache.config().purge_loop_time;

    let thread = thread::Builder::new()
        .name(PURGE_THREAD_NAME.to_string())
        .spawn(move || run_purge_loop(&cache, &shutdown_rx, interval))
        .map_err(|err| CacheError::Spawn(err.to_string()))?;

    Ok(PurgeHandle { shutdown, thread })
}

fn run_purge_loop(cache: &QueryCache, shutdown_rx: &watch::Receiver<bool>, interval: Duration) {
    info!(
        "Starting purge thread with interval of {} ms",
        interval.as_millis()
    );

    while !wait_for_wake(shutdown_rx, interval) {
        let report = cache.purge_pass();
        if report.skipped {
            debug!(
                "Purge skipped: {}% used is below the low-water mark",
                report.used_pct
            );
        } else if report.sweep.reclaimed > 0 {
            info!(
                "Purge: reclaimed {} entries ({} bytes), unlinked {}, scanned {}",
                report.sweep.reclaimed,
                report.sweep.bytes_freed,
                report.sweep.expired,
                report.sweep.scanned
            );
        } else {
            debug!("Purge: scanned {} entries, nothing reclaimed", report.sweep.scanned);
        }
    }

    info!("Purge thread stopped");
}

/// Parks until the next wake is due. Returns `true` if shutdown was
/// requested instead.
fn wait_for_wake(shutdown_rx: &watch::Receiver<bool>, interval: Duration) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if shutdown_requested(shutdown_rx) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::park_timeout(deadline - now);
    }
}

fn shutdown_requested(shutdown_rx: &watch::Receiver<bool>) -> bool {
    match shutdown_rx.has_changed() {
        Ok(_) => *shutdown_rx.borrow(),
        // sender dropped
        Err(_) => true,
    }
}
