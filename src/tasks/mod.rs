//! Background Tasks Module
//!
//! Contains background workers that run for the lifetime of a cache.
//!
//! # Tasks
//! - Purge driver: incrementally reclaims expired and tombstoned entries

mod purge;

pub use purge::{spawn_purge_task, PurgeHandle, PURGE_THREAD_NAME};
