//! Tiered Cache
//!
//! Two-level cache: an in-process [`MemoryLayer`] in front of an optional
//! [`DistributedStore`]. Every distributed call goes through a circuit
//! breaker and a timeout; any failure there is logged, counted and
//! downgraded to L1-only behavior, never returned to the caller.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::codec;
use super::distributed::DistributedStore;
use super::memory::{Lookup, MemoryLayer};
use super::stats::{CacheStats, StatsCounters};
use super::CacheEntry;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::policy::KeyPolicy;
use crate::resilience::{CircuitBreaker, CircuitBreakerRegistry, CircuitConfig};

/// Registry name of the breaker guarding the distributed layer.
pub const L2_CIRCUIT: &str = "cache_l2";

// == Set Options ==
/// Per-write options for [`TieredCache::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Explicit TTL in seconds; wins over `data_type`
    pub ttl: Option<u64>,
    /// Semantic category used to pick a TTL from the key policy
    pub data_type: Option<String>,
    pub tags: Vec<String>,
    /// Compress the L2 payload when it is above the policy threshold
    pub compress: bool,
    /// Write to the distributed layer only
    pub skip_l1: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn skip_l1(mut self, skip: bool) -> Self {
        self.skip_l1 = skip;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    L1,
    L2,
}

struct Inner {
    l1: MemoryLayer,
    l2: OnceLock<Arc<dyn DistributedStore>>,
    /// A distributed layer was configured, attached or not
    l2_expected: bool,
    policy: KeyPolicy,
    breaker: Arc<CircuitBreaker>,
    counters: StatsCounters,
    connected: AtomicBool,
    l2_timeout: Duration,
    promotion_ttl: u64,
}

// == Tiered Cache ==
/// Cheap to clone; every clone shares the same layers and counters.
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("l1_entries", &self.inner.l1.len())
            .field("l2", &self.inner.l2.get().map(|s| s.name()))
            .field("connected", &self.inner.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl TieredCache {
    pub fn new(
        config: &Config,
        l2: Option<Arc<dyn DistributedStore>>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let connected = l2.is_some();
        let l2_expected = connected || config.redis_url.is_some();
        Self {
            inner: Arc::new(Inner {
                l1: MemoryLayer::new(config.max_entries),
                l2: l2.map(OnceLock::from).unwrap_or_default(),
                l2_expected,
                policy: KeyPolicy::from_config(config),
                breaker,
                counters: StatsCounters::default(),
                connected: AtomicBool::new(connected),
                l2_timeout: Duration::from_millis(config.l2_timeout_ms.max(1)),
                promotion_ttl: config.l1_promotion_ttl.max(1),
            }),
        }
    }

    /// Builds the cache with the `cache_l2` breaker taken from `registry`.
    pub fn from_config(
        config: &Config,
        l2: Option<Arc<dyn DistributedStore>>,
        registry: &CircuitBreakerRegistry,
    ) -> Self {
        let breaker = registry.get_or_create(
            L2_CIRCUIT,
            CircuitConfig::new(
                config.circuit_max_failures,
                Duration::from_secs(config.circuit_reset_timeout),
            ),
        );
        Self::new(config, l2, breaker)
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.inner.policy
    }

    /// Builds a cache key through the key policy.
    pub fn key(&self, raw_key: &str, namespace: Option<&str>) -> String {
        self.inner.policy.build_key(raw_key, namespace)
    }

    /// Whether a distributed store is attached.
    pub fn has_distributed(&self) -> bool {
        self.inner.l2.get().is_some()
    }

    /// Whether a distributed layer is configured, even if it has not been
    /// reached yet.
    pub fn distributed_configured(&self) -> bool {
        self.inner.l2_expected || self.has_distributed()
    }

    /// Attaches a distributed store after startup, for a layer that was
    /// unreachable when the cache was built. Returns `false` if a store is
    /// already attached.
    pub fn attach_distributed(&self, store: Arc<dyn DistributedStore>) -> bool {
        let name = store.name();
        if self.inner.l2.set(store).is_err() {
            return false;
        }
        self.inner.connected.store(true, Ordering::Relaxed);
        info!(store = name, "distributed cache attached");
        true
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    // == Get ==
    /// Reads a typed value, L1 first, then L2.
    ///
    /// A value that cannot be decoded as `T` is deleted and reported as a
    /// miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let (value, layer) = match self.lookup(key).await {
            Some(found) => found,
            None => {
                StatsCounters::incr(&self.inner.counters.misses);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(typed) => {
                self.record_hit(layer);
                Some(typed)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cached value has unexpected shape, dropping it");
                self.delete(key).await;
                StatsCounters::incr(&self.inner.counters.misses);
                None
            }
        }
    }

    pub async fn get_value(&self, key: &str) -> Option<Value> {
        self.get::<Value>(key).await
    }

    async fn lookup(&self, key: &str) -> Option<(Value, Layer)> {
        match self.inner.l1.get(key) {
            Lookup::Hit(value) => return Some((value, Layer::L1)),
            Lookup::Expired => StatsCounters::incr(&self.inner.counters.expired),
            Lookup::Missing => {}
        }

        let stored = self
            .l2_call("get", |store| async move { store.get(key).await })
            .await
            .flatten()?;
        let value = self.decode_or_drop(key, &stored.bytes).await?;
        self.promote(key, value.clone(), stored.ttl);
        Some((value, Layer::L2))
    }

    fn record_hit(&self, layer: Layer) {
        let counter = match layer {
            Layer::L1 => &self.inner.counters.l1_hits,
            Layer::L2 => &self.inner.counters.l2_hits,
        };
        StatsCounters::incr(counter);
    }

    /// Decodes an L2 payload; corrupt payloads are deleted from L2.
    async fn decode_or_drop(&self, key: &str, payload: &[u8]) -> Option<Value> {
        match codec::decode(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "corrupt payload in distributed cache, treating as miss");
                let keys = vec![key.to_string()];
                self.l2_call("delete", |store| async move { store.delete(&keys).await })
                    .await;
                None
            }
        }
    }

    /// Copies an L2 hit into L1. The copy never outlives the L2 value.
    fn promote(&self, key: &str, value: Value, remaining: Option<Duration>) {
        let mut ttl_ms = self.inner.promotion_ttl.saturating_mul(1000);
        if let Some(left) = remaining {
            ttl_ms = ttl_ms.min(left.as_millis() as u64);
        }
        if ttl_ms == 0 {
            return;
        }
        self.insert_l1(key, CacheEntry::with_ttl_ms(value, ttl_ms, HashSet::new()));
    }

    fn insert_l1(&self, key: &str, entry: CacheEntry) {
        if let Some(evicted) = self.inner.l1.insert(key, entry) {
            debug!(key = %evicted, "evicted least recently used entry");
            StatsCounters::incr(&self.inner.counters.evictions);
        }
    }

    // == Set ==
    /// Serializes `value` and writes it through both layers.
    ///
    /// Only fails when `value` itself cannot be serialized.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<()> {
        let json = serde_json::to_value(value)
            .map_err(|e| CacheError::InvalidRequest(format!("value is not serializable: {e}")))?;
        self.set_value(key, json, options).await;
        Ok(())
    }

    /// Writes an already serialized value through both layers.
    pub async fn set_value(&self, key: &str, value: Value, options: SetOptions) {
        let ttl = options
            .ttl
            .or_else(|| options.data_type.as_deref().map(|t| self.inner.policy.select_ttl(t)))
            .unwrap_or_else(|| self.inner.policy.default_ttl())
            .max(1);
        let tags: HashSet<String> = options.tags.iter().cloned().collect();
        StatsCounters::incr(&self.inner.counters.sets);

        let payload = if self.has_distributed() {
            self.encode(key, &value, options.compress)
        } else {
            None
        };

        if options.skip_l1 {
            self.inner.l1.remove(key);
        } else {
            self.insert_l1(key, CacheEntry::new(value, ttl, tags.clone()));
        }

        let Some(payload) = payload else {
            return;
        };
        let ttl = Duration::from_secs(ttl);
        let written = AtomicBool::new(false);
        let written_flag = &written;
        let stored = self
            .l2_call("set", |store| async move {
                store.set(key, &payload, ttl).await?;
                written_flag.store(true, Ordering::Relaxed);
                for tag in &tags {
                    store.tag_add(tag, key, ttl).await?;
                }
                Ok::<(), CacheError>(())
            })
            .await;
        if stored.is_some() {
            return;
        }

        // value landed but its tags did not: tag invalidation could not reach it
        if written.load(Ordering::Relaxed) {
            let keys = vec![key.to_string()];
            self.l2_call("delete", |store| async move { store.delete(&keys).await })
                .await;
        }
        debug!(key = %key, "value kept in L1 only");
    }

    fn encode(&self, key: &str, value: &Value, compress: bool) -> Option<Vec<u8>> {
        let encoded = codec::to_bytes(value).and_then(|raw| {
            if compress && self.inner.policy.should_compress(raw.len()) {
                codec::compress(&raw)
            } else {
                Ok(raw)
            }
        });
        match encoded {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode value for distributed cache");
                None
            }
        }
    }

    // == Delete ==
    /// Removes a key from both layers. Returns whether either layer held it.
    pub async fn delete(&self, key: &str) -> bool {
        let in_l1 = self.inner.l1.remove(key);
        let keys = vec![key.to_string()];
        let in_l2 = self
            .l2_call("delete", |store| async move { store.delete(&keys).await })
            .await
            .is_some_and(|existed| existed.into_iter().any(|e| e));
        StatsCounters::incr(&self.inner.counters.deletes);
        in_l1 || in_l2
    }

    // == Tag Invalidation ==
    /// Deletes every key carrying `tag` from both layers along with the
    /// tag's own index entry. Returns how many distinct keys were live.
    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut keys = self.inner.l1.take_tag(tag);
        if let Some(remote) = self
            .l2_call("tag_members", |store| async move { store.tag_members(tag).await })
            .await
        {
            keys.extend(remote);
        }

        let keys: Vec<String> = keys.into_iter().collect();
        let mut live: Vec<bool> = keys.iter().map(|k| self.inner.l1.remove(k)).collect();

        let targets = &keys;
        if let Some(existed) = self
            .l2_call("delete", |store| async move {
                let existed = store.delete(targets).await?;
                store.tag_delete(tag).await?;
                Ok::<_, CacheError>(existed)
            })
            .await
        {
            for (slot, was_there) in live.iter_mut().zip(existed) {
                *slot |= was_there;
            }
        }

        let count = live.into_iter().filter(|l| *l).count();
        StatsCounters::add(&self.inner.counters.invalidations, count as u64);
        info!(tag = %tag, invalidated = count, "invalidated tag");
        count
    }

    // == Batch Get ==
    /// Reads many keys at once. The result has one slot per input key, in
    /// input order. L1 is consulted first; the remaining keys go to L2 in a
    /// single batch.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        let mut results: Vec<Option<T>> = Vec::with_capacity(keys.len());
        let mut pending: Vec<usize> = Vec::new();

        for (idx, key) in keys.iter().enumerate() {
            let typed = match self.inner.l1.get(key) {
                Lookup::Hit(value) => self.typed_or_drop::<T>(key, value),
                Lookup::Expired => {
                    StatsCounters::incr(&self.inner.counters.expired);
                    None
                }
                Lookup::Missing => None,
            };
            match typed {
                Some(v) => {
                    self.record_hit(Layer::L1);
                    results.push(Some(v));
                }
                None => {
                    pending.push(idx);
                    results.push(None);
                }
            }
        }

        if !pending.is_empty() {
            let wanted: Vec<String> = pending.iter().map(|&i| keys[i].clone()).collect();
            let fetched = self
                .l2_call("mget", |store| async move { store.mget(&wanted).await })
                .await;
            if let Some(payloads) = fetched {
                for (&idx, stored) in pending.iter().zip(payloads) {
                    let Some(stored) = stored else { continue };
                    let key = &keys[idx];
                    let Some(value) = self.decode_or_drop(key, &stored.bytes).await else {
                        continue;
                    };
                    self.promote(key, value.clone(), stored.ttl);
                    if let Some(v) = self.typed_or_drop::<T>(key, value) {
                        self.record_hit(Layer::L2);
                        results[idx] = Some(v);
                    }
                }
            }
        }

        let misses = results.iter().filter(|r| r.is_none()).count();
        StatsCounters::add(&self.inner.counters.misses, misses as u64);
        results
    }

    fn typed_or_drop<T: DeserializeOwned>(&self, key: &str, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = %key, error = %e, "cached value has unexpected shape, dropping it");
                self.inner.l1.remove(key);
                None
            }
        }
    }

    // == Get Or Set ==
    /// Returns the cached value, or runs `fetcher` and caches its result.
    ///
    /// The fetch and write-back run on their own task: if the caller stops
    /// waiting, the result is still cached once the fetch completes.
    /// Concurrent misses on the same key may each run `fetcher`.
    pub async fn get_or_set<T, F, Fut, E>(
        &self,
        key: &str,
        options: SetOptions,
        fetcher: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: From<CacheError> + Send + 'static,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let cache = self.clone();
        let key = key.to_string();
        let fetch = fetcher();
        let task = tokio::spawn(async move {
            let value = fetch.await?;
            match serde_json::to_value(&value) {
                Ok(json) => cache.set_value(&key, json, options).await,
                Err(e) => warn!(key = %key, error = %e, "fetched value is not serializable, not caching"),
            }
            Ok(value)
        });

        task.await
            .map_err(|e| E::from(CacheError::System(format!("fetch task failed: {e}"))))?
    }

    // == Maintenance ==
    /// Clears L1, the local tag index and, when reachable, L2.
    pub async fn flush(&self) {
        self.inner.l1.clear();
        self.l2_call("flush", |store| async move { store.flush().await })
            .await;
        info!("cache flushed");
    }

    /// Removes expired L1 entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self.inner.l1.purge_expired();
        StatsCounters::add(&self.inner.counters.expired, removed as u64);
        removed
    }

    /// Probes the distributed layer and refreshes the connection flag.
    pub async fn ping(&self) -> bool {
        self.l2_call("ping", |store| async move { store.ping().await })
            .await
            .is_some()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot(
            self.inner.l1.len(),
            self.inner.connected.load(Ordering::Relaxed),
        )
    }

    // == L2 Guard ==
    /// Runs one distributed-layer operation behind the breaker and the
    /// timeout. `None` means "no L2 answer": not configured, short-circuited,
    /// timed out or failed.
    async fn l2_call<T, F, Fut>(&self, op: &'static str, f: F) -> Option<T>
    where
        F: FnOnce(Arc<dyn DistributedStore>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let store = self.inner.l2.get()?.clone();
        let timeout = self.inner.l2_timeout;

        let result = self
            .inner
            .breaker
            .call(|| async move {
                tokio::time::timeout(timeout, f(store)).await.unwrap_or_else(|_| {
                    Err(CacheError::CacheUnavailable(format!(
                        "{op} timed out after {}ms",
                        timeout.as_millis()
                    )))
                })
            })
            .await;

        match result {
            Ok(value) => {
                if !self.inner.connected.swap(true, Ordering::Relaxed) {
                    info!(op, "distributed cache reachable again");
                }
                Some(value)
            }
            Err(e) => {
                StatsCounters::incr(&self.inner.counters.l2_errors);
                self.inner.connected.store(false, Ordering::Relaxed);
                warn!(op, error = %e, "distributed cache call failed, continuing with L1 only");
                None
            }
        }
    }
}
