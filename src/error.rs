//! Error types for the query cache
//!
//! Provides unified error handling using thiserror.
//! A cache miss is not an error: lookups return `Option`.

use thiserror::Error;

use crate::cache::MIN_KEY_LENGTH;

// == Cache Error Enum ==
/// Unified error type for the query cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key is too short to be routed to a shard
    #[error("Key too short: {len} bytes (minimum {min})", min = MIN_KEY_LENGTH)]
    KeyTooShort { len: usize },

    /// Construction parameters are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The purge driver thread could not be started
    #[error("Failed to spawn purge thread: {0}")]
    Spawn(String),
}

// == Result Type Alias ==
/// Convenience Result type for the query cache.
pub type Result<T> = std::result::Result<T, CacheError>;
