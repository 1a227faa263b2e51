//! Query Cache - a sharded, memory-bounded result cache
//!
//! Maps opaque byte keys to opaque byte values with per-entry TTL. Removal is
//! logical (tombstoning) and memory is reclaimed incrementally by a
//! background purge driver under a global byte budget.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, QueryCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_purge_task, PurgeHandle};
