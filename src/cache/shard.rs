//! Shard Module
//!
//! One partition of the cache: a lookup index, an append-only storage log of
//! every entry created in the shard, and the incremental purge cursor. All
//! three are guarded together by a single read-write lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::cache::entry::{CacheEntry, EntryRef};
use crate::cache::stats::Counters;

/// Sweeps never plan fewer entries than this (unless the log is shorter).
pub const MIN_PURGE_CHUNK: usize = 10;

/// Number of log entries a new sweep will walk per wake.
///
/// `ceil(len * ratio)`, raised to [`MIN_PURGE_CHUNK`] and capped at `len`,
/// so a non-empty log always makes progress.
pub fn chunk_size(len: usize, ratio: f64) -> usize {
    let target = (len as f64 * ratio).ceil() as usize;
    target.max(MIN_PURGE_CHUNK).min(len)
}

// == Purge Cursor ==
/// Per-shard sweep position. `position == 0` means idle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeCursor {
    /// Entries below this index have not been visited in the current sweep
    pub position: usize,
    /// Entries to visit per wake during the current sweep
    pub chunk_size: usize,
}

impl PurgeCursor {
    pub fn is_idle(&self) -> bool {
        self.position == 0
    }
}

// == Sweep Parameters ==
/// Inputs for one wake's sweep of a shard.
#[derive(Debug, Clone, Copy)]
pub struct SweepParams {
    /// Cached current time
    pub now: i64,
    /// Wake interval over full-sweep target duration
    pub ratio: f64,
    /// Also evict live entries accessed less recently than the chunk average
    pub aggressive: bool,
}

// == Sweep Report ==
/// What a single sweep of one shard did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Log entries visited
    pub scanned: usize,
    /// Live entries unlinked from the index (expired or evicted)
    pub expired: usize,
    /// Entries physically dropped from the log
    pub reclaimed: usize,
    /// Bytes released by reclaimed entries
    pub bytes_freed: u64,
    /// The cursor reached the start of the log
    pub completed: bool,
}

impl SweepReport {
    pub(crate) fn merge(&mut self, other: SweepReport) {
        self.scanned += other.scanned;
        self.expired += other.expired;
        self.reclaimed += other.reclaimed;
        self.bytes_freed += other.bytes_freed;
    }
}

// == Shard State ==
/// State guarded by the shard lock.
#[derive(Debug, Default)]
pub struct ShardState {
    index: HashMap<Arc<[u8]>, Arc<CacheEntry>>,
    log: Vec<Arc<CacheEntry>>,
    /// Bytes held by entries in the log
    bytes: u64,
    cursor: PurgeCursor,
}

impl ShardState {
    /// Appends `entry` to the log and makes it the live mapping for its key.
    ///
    /// Returns `true` if a previous entry was displaced; it is tombstoned,
    /// not freed, since readers may still hold it.
    fn insert(&mut self, entry: Arc<CacheEntry>) -> bool {
        self.bytes += entry.footprint();
        self.log.push(Arc::clone(&entry));
        match self.index.insert(entry.key_handle(), entry) {
            Some(previous) => {
                previous.tombstone();
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, key: &[u8]) -> bool {
        match self.index.remove(key) {
            Some(entry) => {
                entry.tombstone();
                true
            }
            None => false,
        }
    }

    /// Drops every live mapping, tombstoning each entry. The log is untouched.
    pub(crate) fn clear_index(&mut self) -> usize {
        let cleared = self.index.len();
        for (_, entry) in self.index.drain() {
            entry.tombstone();
        }
        cleared
    }

    /// Removes `entry` from the index if it is still the live mapping, then
    /// tombstones it.
    fn unlink(&mut self, entry: &Arc<CacheEntry>) {
        let is_current = self
            .index
            .get(entry.key())
            .is_some_and(|current| Arc::ptr_eq(current, entry));
        if is_current {
            self.index.remove(entry.key());
        }
        entry.tombstone();
    }

    /// Mean access time of the fresh entries in `log[start..end]`.
    fn mean_access(&self, start: usize, end: usize, now: i64) -> Option<i64> {
        let (sum, count) = self.log[start..end]
            .iter()
            .filter(|entry| entry.is_fresh(now))
            .fold((0i128, 0i128), |(sum, count), entry| {
                (sum + entry.access() as i128, count + 1)
            });
        (count > 0).then(|| (sum / count) as i64)
    }

    // == Sweep ==
    /// Walks up to one chunk of the log backward from the cursor.
    ///
    /// Expired live entries are unlinked and tombstoned; tombstoned entries
    /// with no readers are dropped from the log by swap-remove and their
    /// bytes released.
    fn sweep(&mut self, params: SweepParams, counters: &Counters) -> SweepReport {
        let mut report = SweepReport::default();

        if self.cursor.is_idle() {
            if self.log.is_empty() {
                return report;
            }
            self.cursor = PurgeCursor {
                position: self.log.len(),
                chunk_size: chunk_size(self.log.len(), params.ratio),
            };
        }

        let stop = self.cursor.position.saturating_sub(self.cursor.chunk_size);
        let cutoff = if params.aggressive {
            self.mean_access(stop, self.cursor.position, params.now)
        } else {
            None
        };

        while self.cursor.position > stop {
            self.cursor.position -= 1;
            let idx = self.cursor.position;
            let entry = Arc::clone(&self.log[idx]);
            report.scanned += 1;

            let evict = cutoff.is_some_and(|c| entry.is_fresh(params.now) && entry.access() < c);
            if entry.is_expired(params.now) || evict {
                self.unlink(&entry);
                report.expired += 1;
            }

            if entry.is_reclaimable() {
                let removed = self.log.swap_remove(idx);
                let footprint = removed.footprint();
                debug_assert!(self.bytes >= footprint, "shard byte accounting drifted");
                self.bytes -= footprint;
                removed.mark_reclaimed();
                counters.record_purge(
                    removed.key_len(),
                    removed.value_len(),
                    footprint - removed.key_len() - removed.value_len(),
                );
                report.reclaimed += 1;
                report.bytes_freed += footprint;
            }
        }

        report.completed = self.cursor.is_idle();
        report
    }

    /// Drops every entry, returning how many were held. Requires exclusive
    /// access; readers must be gone.
    fn teardown(&mut self) -> usize {
        self.index.clear();
        let held = self.log.len();
        for entry in self.log.drain(..) {
            entry.tombstone();
            entry.mark_reclaimed();
        }
        self.bytes = 0;
        self.cursor = PurgeCursor::default();
        held
    }
}

// == Shard ==
/// A lock-guarded cache partition.
#[derive(Debug, Default)]
pub struct Shard {
    state: RwLock<ShardState>,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the live entry for `key` and takes a reader reference on it.
    ///
    /// The reference is taken before the read lock is released.
    pub fn lookup(&self, key: &[u8]) -> Option<EntryRef> {
        let state = self.state.read();
        state.index.get(key).map(EntryRef::acquire)
    }

    /// Installs `entry`, tombstoning any entry it displaces.
    pub fn insert(&self, entry: Arc<CacheEntry>) -> bool {
        self.state.write().insert(entry)
    }

    /// Removes the live mapping for `key`, tombstoning its entry.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.state.write().remove(key)
    }

    /// Exclusive access, used when several shards must be held at once.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, ShardState> {
        self.state.write()
    }

    /// Runs one wake's worth of purging on this shard.
    pub fn sweep(&self, params: SweepParams, counters: &Counters) -> SweepReport {
        self.state.write().sweep(params, counters)
    }

    pub(crate) fn teardown(&mut self) -> usize {
        self.state.get_mut().teardown()
    }

    /// Live entries reachable through lookup.
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries physically held, tombstoned or not.
    pub fn log_len(&self) -> usize {
        self.state.read().log.len()
    }

    pub fn bytes(&self) -> u64 {
        self.state.read().bytes
    }

    pub fn cursor(&self) -> PurgeCursor {
        self.state.read().cursor
    }
}
