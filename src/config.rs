//! Configuration Module
//!
//! Handles loading and validating cache construction parameters.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default memory budget used by the host binary (64 MiB).
pub const DEFAULT_MAX_MEMORY_SIZE: u64 = 64 * 1024 * 1024;

/// Default number of shards.
pub const DEFAULT_SHARD_COUNT: usize = 16;

/// Default purge wake interval.
pub const DEFAULT_PURGE_LOOP_TIME: Duration = Duration::from_millis(400);

/// Default target duration for one full sweep over a shard's storage log.
pub const DEFAULT_PURGE_TOTAL_TIME: Duration = Duration::from_secs(10);

/// Below this occupancy (percent) the purge driver leaves every shard alone.
pub const DEFAULT_PURGE_THRESHOLD_PCT_MIN: u32 = 3;

/// At or above this occupancy (percent) sweeps purge aggressively.
pub const DEFAULT_PURGE_THRESHOLD_PCT_MAX: u32 = 90;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Memory budget in bytes (keys + values + per-entry overhead)
    pub max_memory_size: u64,
    /// Number of independent shards
    pub shard_count: usize,
    /// Interval between purge driver wakes
    pub purge_loop_time: Duration,
    /// Target duration of a full sweep over each shard's log
    pub purge_total_time: Duration,
    /// Low-water mark, in percent of the budget
    pub purge_threshold_pct_min: u32,
    /// High-water mark, in percent of the budget
    pub purge_threshold_pct_max: u32,
    /// Interval between telemetry snapshots logged by the host binary
    pub stats_interval: Duration,
}

impl Config {
    /// Creates a Config with the given budget and defaults for everything else.
    pub fn with_max_memory(max_memory_size: u64) -> Self {
        Self {
            max_memory_size,
            ..Self::default()
        }
    }

    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `QC_MAX_MEMORY_SIZE` - Memory budget in bytes (default: 64 MiB)
    /// - `QC_SHARD_COUNT` - Number of shards (default: 16)
    /// - `QC_PURGE_LOOP_MS` - Purge wake interval (default: 400)
    /// - `QC_PURGE_TOTAL_MS` - Full sweep target duration (default: 10000)
    /// - `QC_PURGE_THRESHOLD_PCT_MIN` - Low-water mark (default: 3)
    /// - `QC_PURGE_THRESHOLD_PCT_MAX` - High-water mark (default: 90)
    /// - `QC_STATS_INTERVAL_SECS` - Telemetry log interval (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_memory_size: parse_var("QC_MAX_MEMORY_SIZE").unwrap_or(defaults.max_memory_size),
            shard_count: parse_var("QC_SHARD_COUNT").unwrap_or(defaults.shard_count),
            purge_loop_time: parse_var("QC_PURGE_LOOP_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.purge_loop_time),
            purge_total_time: parse_var("QC_PURGE_TOTAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.purge_total_time),
            purge_threshold_pct_min: parse_var("QC_PURGE_THRESHOLD_PCT_MIN")
                .unwrap_or(defaults.purge_threshold_pct_min),
            purge_threshold_pct_max: parse_var("QC_PURGE_THRESHOLD_PCT_MAX")
                .unwrap_or(defaults.purge_threshold_pct_max),
            stats_interval: parse_var("QC_STATS_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stats_interval),
        }
    }

    /// Checks that every parameter is within range.
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_size == 0 {
            return Err(invalid("max_memory_size must be positive"));
        }
        if self.shard_count == 0 {
            return Err(invalid("shard_count must be positive"));
        }
        if self.purge_loop_time.is_zero() || self.purge_total_time.is_zero() {
            return Err(invalid("purge durations must be positive"));
        }
        if self.purge_loop_time > self.purge_total_time {
            return Err(invalid("purge_loop_time must not exceed purge_total_time"));
        }
        if self.purge_threshold_pct_max > 100 {
            return Err(invalid("purge_threshold_pct_max must be at most 100"));
        }
        if self.purge_threshold_pct_min > self.purge_threshold_pct_max {
            return Err(invalid(
                "purge_threshold_pct_min must not exceed purge_threshold_pct_max",
            ));
        }
        Ok(())
    }

    /// Fraction of a shard's log a single sweep should cover.
    pub(crate) fn sweep_ratio(&self) -> f64 {
        self.purge_loop_time.as_secs_f64() / self.purge_total_time.as_secs_f64()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_memory_size: DEFAULT_MAX_MEMORY_SIZE,
            shard_count: DEFAULT_SHARD_COUNT,
            purge_loop_time: DEFAULT_PURGE_LOOP_TIME,
            purge_total_time: DEFAULT_PURGE_TOTAL_TIME,
            purge_threshold_pct_min: DEFAULT_PURGE_THRESHOLD_PCT_MIN,
            purge_threshold_pct_max: DEFAULT_PURGE_THRESHOLD_PCT_MAX,
            stats_interval: Duration::from_secs(60),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn invalid(msg: &str) -> CacheError {
    CacheError::InvalidConfig(msg.to_string())
}
