//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check lookup, accounting and purge behaviour over
//! arbitrary operation sequences.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{
    chunk_size, shard_index, ManualClock, QueryCache, ENTRY_OVERHEAD, MIN_KEY_LENGTH,
    MIN_PURGE_CHUNK,
};
use crate::config::Config;

// == Test Configuration ==
const START: i64 = 1_700_000_000;
const TEST_BUDGET: u64 = 64 * 1024 * 1024;

fn test_cache() -> (QueryCache, ManualClock) {
    let clock = ManualClock::new(START);
    let config = Config {
        purge_threshold_pct_min: 0,
        ..Config::with_max_memory(TEST_BUDGET)
    };
    let cache = QueryCache::with_clock(config, Arc::new(clock.clone())).unwrap();
    (cache, clock)
}

// == Strategies ==
/// Generates routable keys (at least three bytes)
fn valid_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), MIN_KEY_LENGTH..32)
}

/// Generates keys too short to route
fn short_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..MIN_KEY_LENGTH)
}

fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Operations over a small key space so overwrites and deletes collide
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: u8, value: Vec<u8> },
    Get { key: u8 },
    Delete { key: u8 },
    Flush,
    Purge,
}

fn key_name(key: u8) -> Vec<u8> {
    format!("key-{key}").into_bytes()
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (0u8..16, value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        4 => (0u8..16).prop_map(|key| CacheOp::Get { key }),
        1 => (0u8..16).prop_map(|key| CacheOp::Delete { key }),
        1 => Just(CacheOp::Flush),
        2 => Just(CacheOp::Purge),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Keys shorter than three bytes never reach a shard
    #[test]
    fn prop_short_keys_rejected(key in short_key_strategy(), value in value_strategy()) {
        let (cache, _) = test_cache();

        prop_assert!(cache.set(&key, &value, 60).is_err());
        prop_assert!(cache.get(&key).is_none());
        prop_assert_eq!(cache.used_memory(), 0);
        prop_assert_eq!(cache.stats().set_rejects, 1);
    }

    // A stored value reads back unchanged and is independent of the caller's buffer
    #[test]
    fn prop_value_is_owned_copy(key in valid_key_strategy(), value in value_strategy()) {
        let (cache, _) = test_cache();
        let mut buffer = value.clone();

        cache.set(&key, &buffer, 3600).unwrap();
        buffer.iter_mut().for_each(|b| *b = b.wrapping_add(1));

        prop_assert_eq!(cache.get(&key), Some(value));
    }

    // The cache behaves like a map under any sequence of operations, and
    // byte accounting always matches what the logs physically hold
    #[test]
    fn prop_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let (cache, _) = test_cache();
        let mut model: HashMap<u8, Vec<u8>> = HashMap::new();
        let mut expected_hits = 0u64;
        let mut expected_gets = 0u64;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    cache.set(&key_name(key), &value, 3600).unwrap();
                    model.insert(key, value);
                }
                CacheOp::Get { key } => {
                    expected_gets += 1;
                    let got = cache.get(&key_name(key));
                    if got.is_some() {
                        expected_hits += 1;
                    }
                    prop_assert_eq!(got.as_ref(), model.get(&key));
                }
                CacheOp::Delete { key } => {
                    prop_assert_eq!(cache.delete(&key_name(key)), model.remove(&key).is_some());
                }
                CacheOp::Flush => {
                    prop_assert_eq!(cache.flush(), model.len());
                    model.clear();
                }
                CacheOp::Purge => {
                    cache.purge_pass();
                }
            }

            prop_assert_eq!(cache.len(), model.len());
            let held: u64 = (0..cache.shard_count())
                .map(|i| cache.shard(i).unwrap().bytes())
                .sum();
            prop_assert_eq!(cache.used_memory(), held);
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.gets, expected_gets);
        prop_assert_eq!(stats.hits, expected_hits);
    }

    // Enough purge passes release everything once all entries are dead
    #[test]
    fn prop_purge_eventually_reclaims_all(
        entries in prop::collection::vec((valid_key_strategy(), value_strategy()), 1..200)
    ) {
        let (cache, clock) = test_cache();
        for (key, value) in &entries {
            cache.set(key, value, 10).unwrap();
        }
        clock.advance(10);

        let total = cache.log_len();
        let mut passes = 0;
        while cache.log_len() > 0 {
            cache.purge_pass();
            passes += 1;
            prop_assert!(passes <= total, "purge stopped making progress");
        }

        prop_assert_eq!(cache.used_memory(), 0);
        prop_assert_eq!(cache.current_free_memory(), TEST_BUDGET);
        prop_assert_eq!(cache.stats().purges as usize, entries.len());
    }

    // Occupancy figures stay in range regardless of how far usage exceeds the budget
    #[test]
    fn prop_memory_figures_bounded(
        budget in 1u64..4096,
        values in prop::collection::vec(0usize..1024, 1..20)
    ) {
        let clock = ManualClock::new(START);
        let cache = QueryCache::with_clock(Config::with_max_memory(budget), Arc::new(clock)).unwrap();
        let mut charged = 0u64;

        for (i, len) in values.into_iter().enumerate() {
            let key = format!("{i:03}");
            cache.set(key.as_bytes(), &vec![0u8; len], 60).unwrap();
            charged += 3 + len as u64 + ENTRY_OVERHEAD;

            prop_assert_eq!(cache.used_memory(), charged);
            prop_assert!(cache.current_used_memory_pct() <= 100);
            prop_assert_eq!(cache.current_free_memory(), budget.saturating_sub(charged));
        }
    }

    // Chunk sizes make progress and never exceed the log
    #[test]
    fn prop_chunk_size_bounds(len in 0usize..100_000, ratio in 0.0001f64..1.0) {
        let chunk = chunk_size(len, ratio);

        prop_assert!(chunk <= len);
        if len > 0 {
            prop_assert!(chunk >= 1);
        }
        if len < MIN_PURGE_CHUNK {
            prop_assert_eq!(chunk, len);
        } else if (len as f64 * ratio).ceil() as usize > MIN_PURGE_CHUNK {
            prop_assert_eq!(chunk, (len as f64 * ratio).ceil() as usize);
        }
    }

    // Routing depends only on the first three bytes
    #[test]
    fn prop_routing_uses_prefix(
        prefix in prop::collection::vec(any::<u8>(), MIN_KEY_LENGTH),
        a in prop::collection::vec(any::<u8>(), 0..16),
        b in prop::collection::vec(any::<u8>(), 0..16),
        shards in 1usize..64
    ) {
        let key_a = [prefix.as_slice(), a.as_slice()].concat();
        let key_b = [prefix.as_slice(), b.as_slice()].concat();

        let index = shard_index(&key_a, shards).unwrap();
        prop_assert!(index < shards);
        prop_assert_eq!(Some(index), shard_index(&key_b, shards));
    }
}
