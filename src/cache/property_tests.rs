//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache contracts over arbitrary operation
//! sequences. Async cache calls are driven with `tokio_test::block_on`.

use proptest::prelude::*;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::distributed::{DistributedStore, InMemoryStore};
use crate::cache::{CacheEntry, MemoryLayer, SetOptions, TieredCache};
use crate::config::Config;
use crate::policy::{KeyPolicy, TtlTable, HASHED_KEY_PREFIX};
use crate::resilience::CircuitBreakerRegistry;

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;

fn test_config(max_entries: usize) -> Config {
    Config {
        max_entries,
        ..Config::default()
    }
}

fn l1_only_cache(max_entries: usize) -> TieredCache {
    TieredCache::from_config(&test_config(max_entries), None, &CircuitBreakerRegistry::new())
}

fn tiered_cache(max_entries: usize) -> (TieredCache, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let cache = TieredCache::from_config(
        &test_config(max_entries),
        Some(store.clone() as Arc<dyn DistributedStore>),
        &CircuitBreakerRegistry::new(),
    );
    (cache, store)
}

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,3}:[0-9]{1,2}"
}

fn tag_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("room:1"), Just("room:2"), Just("user:9")].prop_map(String::from)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: u32, tags: Vec<String> },
    Get { key: String },
    Delete { key: String },
    Invalidate { tag: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), any::<u32>(), prop::collection::vec(tag_strategy(), 0..3))
            .prop_map(|(key, value, tags)| CacheOp::Set { key, value, tags }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
        tag_strategy().prop_map(|tag| CacheOp::Invalidate { tag }),
    ]
}

fn tags_for(key: &str) -> HashSet<String> {
    let tag = if key.len() % 2 == 0 { "room:1" } else { "room:2" };
    HashSet::from([tag.to_string()])
}

/// Reference model: key -> (value, tags).
type Model = HashMap<String, (u32, HashSet<String>)>;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Reads after any sequence of writes, deletes and tag invalidations
    // agree with a plain map model, and the counters agree with the reads.
    #[test]
    fn prop_matches_model_and_counts_reads(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let cache = l1_only_cache(TEST_MAX_ENTRIES);
        let mut model: Model = HashMap::new();
        let (mut hits, mut misses) = (0u64, 0u64);

        tokio_test::block_on(async {
            for op in ops {
                match op {
                    CacheOp::Set { key, value, tags } => {
                        cache.set(&key, &value, SetOptions::new().tags(tags.clone())).await.unwrap();
                        model.insert(key, (value, tags.into_iter().collect()));
                    }
                    CacheOp::Get { key } => {
                        let got = cache.get::<u32>(&key).await;
                        let expected = model.get(&key).map(|(v, _)| *v);
                        prop_assert_eq!(got, expected);
                        if got.is_some() { hits += 1 } else { misses += 1 }
                    }
                    CacheOp::Delete { key } => {
                        let existed = cache.delete(&key).await;
                        prop_assert_eq!(existed, model.remove(&key).is_some());
                    }
                    CacheOp::Invalidate { tag } => {
                        let expected = model.values().filter(|(_, t)| t.contains(&tag)).count();
                        model.retain(|_, (_, t)| !t.contains(&tag));
                        prop_assert_eq!(cache.invalidate_by_tag(&tag).await, expected);
                    }
                }
            }
            Ok(())
        })?;

        let stats = cache.stats();
        prop_assert_eq!(stats.l1_hits, hits);
        prop_assert_eq!(stats.misses, misses);
        prop_assert_eq!(stats.l1_entries, model.len());
    }

    // The same model holds when a distributed layer sits behind L1 and L1
    // is small enough to keep evicting. Each key always carries the same
    // tags here: re-tagging a key leaves it in its old L2 tag set.
    #[test]
    fn prop_two_layers_survive_l1_eviction(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let (cache, _store) = tiered_cache(4);
        let mut model: Model = HashMap::new();

        tokio_test::block_on(async {
            for op in ops {
                match op {
                    CacheOp::Set { key, value, .. } => {
                        let tags = tags_for(&key);
                        cache.set(&key, &value, SetOptions::new().tags(tags.clone())).await.unwrap();
                        model.insert(key, (value, tags));
                    }
                    CacheOp::Get { key } => {
                        let expected = model.get(&key).map(|(v, _)| *v);
                        prop_assert_eq!(cache.get::<u32>(&key).await, expected);
                    }
                    CacheOp::Delete { key } => {
                        cache.delete(&key).await;
                        model.remove(&key);
                    }
                    CacheOp::Invalidate { tag } => {
                        let expected = model.values().filter(|(_, t)| t.contains(&tag)).count();
                        model.retain(|_, (_, t)| !t.contains(&tag));
                        prop_assert_eq!(cache.invalidate_by_tag(&tag).await, expected);
                    }
                }
            }
            Ok(())
        })?;

        prop_assert!(cache.stats().l1_entries <= 4);
        prop_assert!(cache.stats().redis_connected);
    }

    // L1 never holds more than its capacity.
    #[test]
    fn prop_memory_layer_respects_capacity(
        capacity in 1usize..20,
        keys in prop::collection::vec(key_strategy(), 1..100)
    ) {
        let layer = MemoryLayer::new(capacity);
        for key in &keys {
            layer.insert(key, CacheEntry::new(json!(1), 60, HashSet::new()));
            prop_assert!(layer.len() <= capacity);
        }
        let distinct: HashSet<&String> = keys.iter().collect();
        prop_assert_eq!(layer.len(), distinct.len().min(capacity));
    }

    // mget returns one slot per input key, in input order.
    #[test]
    fn prop_mget_preserves_order(
        stored in prop::collection::hash_map(key_strategy(), any::<u32>(), 0..20),
        wanted in prop::collection::vec(key_strategy(), 0..30)
    ) {
        let (cache, _store) = tiered_cache(8);
        let results = tokio_test::block_on(async {
            for (k, v) in &stored {
                cache.set(k, v, SetOptions::new()).await.unwrap();
            }
            cache.mget::<u32>(&wanted).await
        });

        prop_assert_eq!(results.len(), wanted.len());
        for (key, got) in wanted.iter().zip(results) {
            prop_assert_eq!(got, stored.get(key).copied());
        }
    }

    // Key construction is deterministic and always bounded.
    #[test]
    fn prop_build_key_deterministic_and_bounded(
        raw in "[ -~]{0,400}",
        namespace in prop::option::of("[a-z]{1,12}")
    ) {
        let policy = KeyPolicy::new(None, 250, 1024, TtlTable::new(300));
        let first = policy.build_key(&raw, namespace.as_deref());
        let second = policy.build_key(&raw, namespace.as_deref());

        let joined_len = raw.len() + namespace.as_ref().map_or(0, |ns| ns.len() + 1);

        prop_assert_eq!(&first, &second);
        prop_assert!(first.len() <= 250);
        if joined_len > 250 {
            prop_assert!(first.starts_with(HASHED_KEY_PREFIX));
            prop_assert_eq!(first.len(), 71);
        } else {
            prop_assert_eq!(first.len(), joined_len);
        }
    }
}
