//! Cache Statistics Module
//!
//! Instance-owned operation and byte counters, plus a serializable snapshot
//! for external telemetry.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Counters ==
/// Live counters owned by a cache instance.
///
/// Byte counters are maintained incrementally: set adds, purge subtracts.
#[derive(Debug, Default)]
pub struct Counters {
    pub(crate) gets: AtomicU64,
    pub(crate) hits: AtomicU64,
    pub(crate) sets: AtomicU64,
    pub(crate) set_rejects: AtomicU64,
    pub(crate) deletes: AtomicU64,
    pub(crate) purges: AtomicU64,
    pub(crate) bytes_in: AtomicU64,
    pub(crate) bytes_out: AtomicU64,
    pub(crate) key_bytes: AtomicU64,
    pub(crate) value_bytes: AtomicU64,
    pub(crate) overhead_bytes: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self, value_len: u64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(value_len, Ordering::Relaxed);
    }

    pub(crate) fn record_set(&self, key_len: u64, value_len: u64, overhead: u64) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(value_len, Ordering::Relaxed);
        self.key_bytes.fetch_add(key_len, Ordering::Relaxed);
        self.value_bytes.fetch_add(value_len, Ordering::Relaxed);
        self.overhead_bytes.fetch_add(overhead, Ordering::Relaxed);
    }

    pub(crate) fn record_reject(&self) {
        self.set_rejects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Releases the bytes of one reclaimed entry.
    pub(crate) fn record_purge(&self, key_len: u64, value_len: u64, overhead: u64) {
        release(&self.key_bytes, key_len);
        release(&self.value_bytes, value_len);
        release(&self.overhead_bytes, overhead);
        self.purges.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes currently charged against the budget.
    pub fn used_bytes(&self) -> u64 {
        self.key_bytes.load(Ordering::Relaxed)
            + self.value_bytes.load(Ordering::Relaxed)
            + self.overhead_bytes.load(Ordering::Relaxed)
    }
}

fn release(counter: &AtomicU64, amount: u64) {
    let prev = counter.fetch_sub(amount, Ordering::Relaxed);
    debug_assert!(prev >= amount, "byte accounting drifted below zero");
}

// == Cache Stats ==
/// Point-in-time snapshot of a cache's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Total get calls
    pub gets: u64,
    /// Gets that returned a value
    pub hits: u64,
    /// Accepted set calls
    pub sets: u64,
    /// Set calls rejected for a short key
    pub set_rejects: u64,
    /// Delete calls that removed a live mapping
    pub deletes: u64,
    /// Entries physically reclaimed by the purge driver
    pub purges: u64,
    /// Value bytes accepted by set
    pub bytes_in: u64,
    /// Value bytes served by get
    pub bytes_out: u64,
    /// Key bytes currently held
    pub key_bytes: u64,
    /// Value bytes currently held
    pub value_bytes: u64,
    /// Per-entry overhead bytes currently held
    pub overhead_bytes: u64,
    /// Entries reachable through lookup
    pub live_entries: usize,
    /// Entries physically retained, including tombstones
    pub log_entries: usize,
    /// Budget minus usage, floored at zero
    pub free_memory: u64,
    /// Usage as a percentage of the budget, capped at 100
    pub used_memory_pct: u32,
}

impl CacheStats {
    /// Builds a snapshot from live counters. Entry counts and memory figures
    /// are filled in by the cache.
    pub fn from_counters(counters: &Counters) -> Self {
        Self {
            gets: counters.gets.load(Ordering::Relaxed),
            hits: counters.hits.load(Ordering::Relaxed),
            sets: counters.sets.load(Ordering::Relaxed),
            set_rejects: counters.set_rejects.load(Ordering::Relaxed),
            deletes: counters.deletes.load(Ordering::Relaxed),
            purges: counters.purges.load(Ordering::Relaxed),
            bytes_in: counters.bytes_in.load(Ordering::Relaxed),
            bytes_out: counters.bytes_out.load(Ordering::Relaxed),
            key_bytes: counters.key_bytes.load(Ordering::Relaxed),
            value_bytes: counters.value_bytes.load(Ordering::Relaxed),
            overhead_bytes: counters.overhead_bytes.load(Ordering::Relaxed),
            ..Self::default()
        }
    }

    // == Hit Rate ==
    /// Returns hits / gets, or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits as f64 / self.gets as f64
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.key_bytes + self.value_bytes + self.overhead_bytes
    }
}
