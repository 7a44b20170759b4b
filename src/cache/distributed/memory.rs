//! In-process distributed store.
//!
//! Behaves like the Redis backend (expiring values, expiring sets) but
//! lives in memory. It can be switched offline to exercise the degraded
//! path, and counts calls so tests can see which operations reached L2.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{DistributedStore, StoredPayload};
use crate::cache::entry::current_timestamp_ms;
use crate::error::{CacheError, Result};

#[derive(Debug)]
struct Expiring<T> {
    value: T,
    expires_at: u64,
}

impl<T> Expiring<T> {
    fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

fn expiry(ttl: Duration) -> u64 {
    current_timestamp_ms().saturating_add(ttl.as_millis() as u64)
}

#[derive(Debug)]
pub struct InMemoryStore {
    data: DashMap<String, Expiring<Vec<u8>>>,
    sets: DashMap<String, Expiring<HashSet<String>>>,
    online: AtomicBool,
    calls: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            sets: DashMap::new(),
            online: AtomicBool::new(true),
            calls: AtomicU64::new(0),
        }
    }

    /// Simulates the store going down (`false`) or coming back (`true`).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of operations attempted against this store.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        let now = current_timestamp_ms();
        self.data.iter().filter(|e| e.value().is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes a raw payload directly, bypassing the cache.
    pub fn put_raw(&self, key: &str, payload: Vec<u8>, ttl: Duration) {
        self.data.insert(
            key.to_string(),
            Expiring {
                value: payload,
                expires_at: expiry(ttl),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = current_timestamp_ms();
        self.data.get(key).is_some_and(|e| e.is_live(now))
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::CacheUnavailable("in-memory store offline".to_string()))
        }
    }

    fn read(&self, key: &str) -> Option<StoredPayload> {
        let now = current_timestamp_ms();
        self.data.get(key).filter(|e| e.is_live(now)).map(|e| {
            let left = Duration::from_millis(e.expires_at.saturating_sub(now));
            StoredPayload::new(e.value.clone(), Some(left))
        })
    }
}

#[async_trait]
impl DistributedStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<StoredPayload>> {
        self.check()?;
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()> {
        self.check()?;
        self.put_raw(key, payload.to_vec(), ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<Vec<bool>> {
        self.check()?;
        let now = current_timestamp_ms();
        Ok(keys
            .iter()
            .map(|key| self.data.remove(key).is_some_and(|(_, e)| e.is_live(now)))
            .collect())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<StoredPayload>>> {
        self.check()?;
        Ok(keys.iter().map(|key| self.read(key)).collect())
    }

    async fn tag_add(&self, tag: &str, member: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        let now = current_timestamp_ms();
        let expires_at = expiry(ttl);
        let mut set = self
            .sets
            .entry(tag.to_string())
            .or_insert_with(|| Expiring {
                value: HashSet::new(),
                expires_at,
            });
        if !set.is_live(now) {
            set.value.clear();
        }
        set.value.insert(member.to_string());
        set.expires_at = set.expires_at.max(expires_at);
        Ok(())
    }

    async fn tag_members(&self, tag: &str) -> Result<Vec<String>> {
        self.check()?;
        let now = current_timestamp_ms();
        Ok(self
            .sets
            .get(tag)
            .filter(|s| s.is_live(now))
            .map(|s| s.value.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn tag_delete(&self, tag: &str) -> Result<bool> {
        self.check()?;
        let now = current_timestamp_ms();
        Ok(self.sets.remove(tag).is_some_and(|(_, s)| s.is_live(now)))
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn flush(&self) -> Result<()> {
        self.check()?;
        self.data.clear();
        self.sets.clear();
        Ok(())
    }
}
