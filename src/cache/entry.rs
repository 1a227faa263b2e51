//! Cache Entry Module
//!
//! Defines the record stored for each key, its expiry/tombstone state and
//! the reference guard readers hold while copying a value out.

use std::mem;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

/// Expire values above this are absolute Unix timestamps; at or below it they
/// are durations in seconds (ten years).
pub const EXPIRE_MAX: i64 = 10 * 365 * 24 * 3600;

/// Sentinel expiry marking an entry as logically removed.
pub const TOMBSTONE: i64 = i64::MIN;

/// Bytes charged against the budget for each entry beyond its key and value.
pub const ENTRY_OVERHEAD: u64 = (mem::size_of::<CacheEntry>() + mem::size_of::<Arc<CacheEntry>>()) as u64;

// == Expiry ==
/// Decoded expiry state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Unix timestamp (seconds) after which the entry is stale
    At(i64),
    /// Logically removed, pending reclamation
    Tombstone,
}

/// Resolves a caller-supplied expire into an absolute timestamp.
///
/// Values above [`EXPIRE_MAX`] are taken as absolute timestamps, anything
/// else as seconds relative to `now`.
pub fn resolve_expire(expire: i64, now: i64) -> i64 {
    if expire > EXPIRE_MAX {
        expire
    } else {
        // keep clear of the tombstone sentinel
        now.saturating_add(expire).max(TOMBSTONE + 1)
    }
}

// == Cache Entry ==
/// A single cached value.
///
/// Key and value are immutable once built. Only the access timestamp, the
/// expiry state and the reference count change after insertion.
#[derive(Debug)]
pub struct CacheEntry {
    key: Arc<[u8]>,
    value: Box<[u8]>,
    /// Last access timestamp (Unix seconds), only moves forward
    access: AtomicI64,
    /// Absolute expiry timestamp or [`TOMBSTONE`]
    expire: AtomicI64,
    /// In-flight readers copying the value
    ref_count: AtomicU32,
    /// Set once the owning shard has dropped the entry from its log
    reclaimed: AtomicBool,
}

impl CacheEntry {
    // == Constructor ==
    /// Builds an entry holding its own copies of `key` and `value`.
    ///
    /// # Arguments
    /// * `key` - The key bytes
    /// * `value` - The value bytes
    /// * `expire_at` - Absolute expiry timestamp
    /// * `now` - Cached current time, used as the initial access time
    pub fn new(key: &[u8], value: &[u8], expire_at: i64, now: i64) -> Self {
        Self {
            key: Arc::from(key),
            value: Box::from(value),
            access: AtomicI64::new(now),
            expire: AtomicI64::new(expire_at),
            ref_count: AtomicU32::new(0),
            reclaimed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Shared handle to the key, used as the index key.
    pub(crate) fn key_handle(&self) -> Arc<[u8]> {
        Arc::clone(&self.key)
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn key_len(&self) -> u64 {
        self.key.len() as u64
    }

    pub fn value_len(&self) -> u64 {
        self.value.len() as u64
    }

    /// Total bytes this entry is charged against the budget.
    pub fn footprint(&self) -> u64 {
        self.key_len() + self.value_len() + ENTRY_OVERHEAD
    }

    pub fn access(&self) -> i64 {
        self.access.load(Ordering::Relaxed)
    }

    /// Advances the access timestamp to `now`, never backward.
    pub fn touch(&self, now: i64) {
        self.access.fetch_max(now, Ordering::Relaxed);
    }

    pub fn expiry(&self) -> Expiry {
        match self.expire.load(Ordering::Acquire) {
            TOMBSTONE => Expiry::Tombstone,
            at => Expiry::At(at),
        }
    }

    pub fn is_tombstoned(&self) -> bool {
        self.expiry() == Expiry::Tombstone
    }

    /// True when the entry is not tombstoned and expires strictly after `now`.
    pub fn is_fresh(&self, now: i64) -> bool {
        matches!(self.expiry(), Expiry::At(at) if at > now)
    }

    /// True when the entry is not tombstoned but its expiry has passed.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expiry(), Expiry::At(at) if at <= now)
    }

    // == Tombstone ==
    /// Marks the entry as logically removed.
    ///
    /// Returns `false` if it was already tombstoned.
    pub fn tombstone(&self) -> bool {
        self.expire.swap(TOMBSTONE, Ordering::AcqRel) != TOMBSTONE
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// An entry may be physically dropped only once it is tombstoned and
    /// no reader holds a reference to it.
    pub fn is_reclaimable(&self) -> bool {
        self.is_tombstoned() && self.ref_count() == 0
    }

    pub(crate) fn mark_reclaimed(&self) {
        let was = self.reclaimed.swap(true, Ordering::AcqRel);
        debug_assert!(!was, "entry reclaimed twice");
    }

    pub fn is_reclaimed(&self) -> bool {
        self.reclaimed.load(Ordering::Acquire)
    }
}

// == Entry Reference ==
/// Reader claim on an entry. Holding one keeps the purge driver from
/// reclaiming the entry; dropping it releases the claim.
#[derive(Debug)]
pub struct EntryRef {
    entry: Arc<CacheEntry>,
}

impl EntryRef {
    /// Takes a reference on `entry`. Callers must hold the owning shard's
    /// lock so the increment is ordered before any reclamation check.
    pub(crate) fn acquire(entry: &Arc<CacheEntry>) -> Self {
        entry.ref_count.fetch_add(1, Ordering::AcqRel);
        Self {
            entry: Arc::clone(entry),
        }
    }
}

impl Deref for EntryRef {
    type Target = CacheEntry;

    fn deref(&self) -> &CacheEntry {
        &self.entry
    }
}

impl Drop for EntryRef {
    fn drop(&mut self) {
        let prev = self.entry.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "entry reference count underflow");
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_entry_owns_copies() {
        let mut key = b"abckey".to_vec();
        let mut value = b"value".to_vec();
        let entry = CacheEntry::new(&key, &value, NOW + 10, NOW);

        key[0] = b'z';
        value[0] = b'V';

        assert_eq!(entry.key(), b"abckey");
        assert_eq!(entry.value(), b"value");
        assert_eq!(entry.key_len(), 6);
        assert_eq!(entry.value_len(), 5);
        assert_eq!(entry.footprint(), 11 + ENTRY_OVERHEAD);
    }

    #[test]
    fn test_resolve_expire_relative() {
        assert_eq!(resolve_expire(10, NOW), NOW + 10);
        assert_eq!(resolve_expire(0, NOW), NOW);
        assert_eq!(resolve_expire(EXPIRE_MAX, NOW), NOW + EXPIRE_MAX);
    }

    #[test]
    fn test_resolve_expire_absolute() {
        assert_eq!(resolve_expire(NOW + 5, NOW), NOW + 5);
        assert_eq!(resolve_expire(EXPIRE_MAX + 1, NOW), EXPIRE_MAX + 1);
    }

    #[test]
    fn test_resolve_expire_never_yields_tombstone() {
        assert_ne!(resolve_expire(i64::MIN, NOW), TOMBSTONE);
    }

    #[test]
    fn test_freshness_boundary() {
        let entry = CacheEntry::new(b"abc", b"v", NOW, NOW);

        // Expiry must be strictly in the future
        assert!(!entry.is_fresh(NOW));
        assert!(entry.is_expired(NOW));
        assert!(entry.is_fresh(NOW - 1));
    }

    #[test]
    fn test_tombstone() {
        let entry = CacheEntry::new(b"abc", b"v", NOW + 100, NOW);
        assert_eq!(entry.expiry(), Expiry::At(NOW + 100));

        assert!(entry.tombstone());
        assert!(!entry.tombstone());
        assert_eq!(entry.expiry(), Expiry::Tombstone);
        assert!(!entry.is_fresh(NOW));
        assert!(!entry.is_expired(NOW));
    }

    #[test]
    fn test_touch_only_moves_forward() {
        let entry = CacheEntry::new(b"abc", b"v", NOW + 100, NOW);

        entry.touch(NOW + 5);
        assert_eq!(entry.access(), NOW + 5);

        entry.touch(NOW + 1);
        assert_eq!(entry.access(), NOW + 5);
    }

    #[test]
    fn test_reference_blocks_reclamation() {
        let entry = Arc::new(CacheEntry::new(b"abc", b"v", NOW + 100, NOW));
        entry.tombstone();
        assert!(entry.is_reclaimable());

        let guard = EntryRef::acquire(&entry);
        assert_eq!(entry.ref_count(), 1);
        assert!(!entry.is_reclaimable());
        assert_eq!(guard.value(), b"v");

        drop(guard);
        assert_eq!(entry.ref_count(), 0);
        assert!(entry.is_reclaimable());
    }

    #[test]
    fn test_live_entry_is_not_reclaimable() {
        let entry = CacheEntry::new(b"abc", b"v", NOW - 100, NOW);
        assert!(!entry.is_reclaimable());
    }

    #[test]
    fn test_mark_reclaimed() {
        let entry = CacheEntry::new(b"abc", b"v", NOW, NOW);
        assert!(!entry.is_reclaimed());
        entry.mark_reclaimed();
        assert!(entry.is_reclaimed());
    }
}
