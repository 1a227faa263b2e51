//! Cache Module
//!
//! Sharded in-memory byte cache with TTL, tombstoned removal and
//! incremental memory reclamation.

mod clock;
mod entry;
mod shard;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{resolve_expire, CacheEntry, EntryRef, Expiry, ENTRY_OVERHEAD, EXPIRE_MAX, TOMBSTONE};
pub use shard::{chunk_size, PurgeCursor, Shard, SweepParams, SweepReport, MIN_PURGE_CHUNK};
pub use stats::{CacheStats, Counters};
pub use store::{shard_index, PurgeReport, QueryCache};

// == Public Constants ==
/// Keys shorter than this are rejected; their first bytes pick the shard.
pub const MIN_KEY_LENGTH: usize = 3;
