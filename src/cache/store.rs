//! Cache Store Module
//!
//! The `QueryCache` facade: routes keys to shards, owns the cached clock,
//! the byte budget and the operation counters, and drives purge passes.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::entry::{resolve_expire, CacheEntry, ENTRY_OVERHEAD};
use crate::cache::shard::{Shard, SweepParams, SweepReport};
use crate::cache::stats::{CacheStats, Counters};
use crate::cache::MIN_KEY_LENGTH;
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Shard Routing ==
/// Shard for `key`: the sum of its first three bytes modulo `shard_count`.
///
/// Returns `None` for keys shorter than [`MIN_KEY_LENGTH`].
pub fn shard_index(key: &[u8], shard_count: usize) -> Option<usize> {
    if key.len() < MIN_KEY_LENGTH {
        return None;
    }
    let sum: usize = key[..MIN_KEY_LENGTH].iter().map(|&b| b as usize).sum();
    Some(sum % shard_count)
}

// == Purge Report ==
/// Outcome of one purge driver wake.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    /// Occupancy when the wake started
    pub used_pct: u32,
    /// Occupancy was below the low-water mark; no shard was touched
    pub skipped: bool,
    /// Occupancy was at or above the high-water mark
    pub aggressive: bool,
    /// Totals across all shards
    pub sweep: SweepReport,
}

// == Query Cache ==
/// Sharded, memory-bounded byte cache with per-entry TTL.
#[derive(Debug)]
pub struct QueryCache {
    shards: Box<[Shard]>,
    /// Cached current time, refreshed by the purge driver
    now: AtomicI64,
    clock: Arc<dyn Clock>,
    counters: Counters,
    config: Config,
}

impl QueryCache {
    // == Constructor ==
    /// Creates a cache using the wall clock.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a cache reading time from `clock`.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let shards: Box<[Shard]> = (0..config.shard_count).map(|_| Shard::new()).collect();
        debug!(
            max_memory_size = config.max_memory_size,
            shard_count = config.shard_count,
            "Query cache created"
        );
        Ok(Self {
            shards,
            now: AtomicI64::new(clock.now()),
            clock,
            counters: Counters::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Cached current time (Unix seconds).
    pub fn now(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }

    /// Samples the clock into the cached time.
    pub fn refresh_clock(&self) -> i64 {
        let now = self.clock.now();
        self.now.store(now, Ordering::Relaxed);
        now
    }

    fn shard_for(&self, key: &[u8]) -> Option<&Shard> {
        shard_index(key, self.shards.len()).map(|i| &self.shards[i])
    }

    // == Get ==
    /// Returns a copy of the value stored under `key`, or `None` on a miss.
    ///
    /// Keys shorter than three bytes always miss.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.counters.record_get();
        let entry = self.shard_for(key)?.lookup(key)?;
        debug_assert!(!entry.is_reclaimed(), "reader reached a reclaimed entry");

        let now = self.now();
        if !entry.is_fresh(now) {
            return None;
        }
        let value = entry.value().to_vec();
        self.counters.record_hit(entry.value_len());
        entry.touch(now);
        Some(value)
    }

    // == Set ==
    /// Stores a copy of `value` under `key`.
    ///
    /// `expire` above [`EXPIRE_MAX`](crate::cache::EXPIRE_MAX) is an absolute
    /// Unix timestamp, otherwise a TTL in seconds from the cached time. A
    /// displaced entry is tombstoned and reclaimed later by the purge driver.
    ///
    /// # Errors
    /// `CacheError::KeyTooShort` when `key` has fewer than three bytes.
    pub fn set(&self, key: &[u8], value: &[u8], expire: i64) -> Result<()> {
        let Some(shard) = self.shard_for(key) else {
            self.counters.record_reject();
            trace!(len = key.len(), "Rejected set with short key");
            return Err(CacheError::KeyTooShort { len: key.len() });
        };

        let now = self.now();
        let entry = Arc::new(CacheEntry::new(key, value, resolve_expire(expire, now), now));
        // Charge before the entry is visible to sweeps
        self.counters
            .record_set(entry.key_len(), entry.value_len(), ENTRY_OVERHEAD);
        shard.insert(entry);
        Ok(())
    }

    // == Delete ==
    /// Removes the live mapping for `key`. Returns whether one existed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let removed = self.shard_for(key).is_some_and(|shard| shard.remove(key));
        if removed {
            self.counters.record_delete();
        }
        removed
    }

    // == Flush ==
    /// Makes every key miss and returns how many live entries were dropped.
    ///
    /// Takes every shard's write lock in index order before clearing any of
    /// them. Memory is released later by the purge driver.
    pub fn flush(&self) -> usize {
        let mut guards: Vec<_> = self.shards.iter().map(Shard::write).collect();
        let cleared: usize = guards.iter_mut().map(|state| state.clear_index()).sum();
        drop(guards);
        debug!(cleared, "Flushed query cache");
        cleared
    }

    // == Memory Accounting ==
    /// Bytes currently charged against the budget.
    pub fn used_memory(&self) -> u64 {
        self.counters.used_bytes()
    }

    /// Budget minus usage, floored at zero.
    pub fn current_free_memory(&self) -> u64 {
        self.config
            .max_memory_size
            .saturating_sub(self.used_memory())
    }

    /// Usage as a percentage of the budget, capped at 100.
    pub fn current_used_memory_pct(&self) -> u32 {
        let pct = self.used_memory() as u128 * 100 / self.config.max_memory_size as u128;
        pct.min(100) as u32
    }

    // == Purge ==
    /// Performs one purge driver wake: refreshes the cached time and, unless
    /// occupancy is below the low-water mark, sweeps one chunk of every shard.
    pub fn purge_pass(&self) -> PurgeReport {
        let now = self.refresh_clock();
        let used_pct = self.current_used_memory_pct();
        let mut report = PurgeReport {
            used_pct,
            ..PurgeReport::default()
        };

        if used_pct < self.config.purge_threshold_pct_min {
            report.skipped = true;
            return report;
        }

        report.aggressive = used_pct >= self.config.purge_threshold_pct_max;
        let params = SweepParams {
            now,
            ratio: self.config.sweep_ratio(),
            aggressive: report.aggressive,
        };
        for shard in self.shards.iter() {
            report.sweep.merge(shard.sweep(params, &self.counters));
        }
        report
    }

    // == Introspection ==
    /// Live entries reachable through lookup, across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries physically held across all shards, tombstones included.
    pub fn log_len(&self) -> usize {
        self.shards.iter().map(Shard::log_len).sum()
    }

    pub fn shard(&self, index: usize) -> Option<&Shard> {
        self.shards.get(index)
    }

    /// Snapshot of counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            live_entries: self.len(),
            log_entries: self.log_len(),
            free_memory: self.current_free_memory(),
            used_memory_pct: self.current_used_memory_pct(),
            ..CacheStats::from_counters(&self.counters)
        }
    }
}

impl Drop for QueryCache {
    fn drop(&mut self) {
        let released: usize = self.shards.iter_mut().map(Shard::teardown).sum();
        debug!(released, "Query cache torn down");
    }
}
