//! L1 Memory Layer
//!
//! In-process entries in a sharded concurrent map, bounded by an LRU
//! tracker, plus a local tag index so tag invalidation works even while
//! the distributed layer is down.
//!
//! Lock order is always LRU tracker first, then map shards. No map guard
//! is ever held while taking the tracker lock.

use std::collections::HashSet;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, LruTracker};

// == Lookup Result ==
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Value),
    /// Present but past its expiry; removed as part of the lookup
    Expired,
    Missing,
}

// == Memory Layer ==
#[derive(Debug)]
pub struct MemoryLayer {
    entries: DashMap<String, CacheEntry>,
    tags: DashMap<String, HashSet<String>>,
    lru: Mutex<LruTracker>,
    max_entries: usize,
}

impl MemoryLayer {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            tags: DashMap::new(),
            lru: Mutex::new(LruTracker::new()),
            max_entries: max_entries.max(1),
        }
    }

    // == Get ==
    /// Looks up a key, treating anything past `expires_at` as absent.
    pub fn get(&self, key: &str) -> Lookup {
        let now = current_timestamp_ms();
        let found = self
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired_at(now)).then(|| entry.value.clone()));
        let value = match found {
            Some(Some(value)) => value,
            Some(None) => {
                self.remove_if_expired(key, now);
                return Lookup::Expired;
            }
            None => return Lookup::Missing,
        };

        let mut lru = self.lru.lock();
        if self.entries.contains_key(key) {
            lru.touch(key);
        }
        Lookup::Hit(value)
    }

    // == Insert ==
    /// Stores an entry, overwriting any previous one under the same key.
    ///
    /// Returns the key evicted to make room, if any.
    pub fn insert(&self, key: &str, entry: CacheEntry) -> Option<String> {
        let new_tags = entry.tags.clone();
        let (previous, evicted) = {
            let mut lru = self.lru.lock();
            let mut evicted = None;
            if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
                if let Some(oldest) = lru.evict_oldest() {
                    evicted = self.entries.remove(&oldest).map(|(k, e)| (k, e.tags));
                }
            }
            let previous = self.entries.insert(key.to_string(), entry);
            lru.touch(key);
            (previous, evicted)
        };

        if let Some(previous) = previous {
            let stale: Vec<String> = previous.tags.difference(&new_tags).cloned().collect();
            self.untag(key, stale.iter());
        }
        for tag in &new_tags {
            self.tags.entry(tag.clone()).or_default().insert(key.to_string());
        }

        evicted.map(|(oldest, tags)| {
            self.untag(&oldest, tags.iter());
            oldest
        })
    }

    // == Remove ==
    /// Removes a key. Returns whether a live (unexpired) entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        let removed = {
            let mut lru = self.lru.lock();
            lru.remove(key);
            self.entries.remove(key)
        };

        match removed {
            Some((_, entry)) => {
                self.untag(key, entry.tags.iter());
                !entry.is_expired()
            }
            None => false,
        }
    }

    /// Removes `key` only while the entry under it is still expired at
    /// `now`. A value written after the caller's read is left alone.
    pub(crate) fn remove_if_expired(&self, key: &str, now: u64) -> bool {
        let removed = {
            let mut lru = self.lru.lock();
            let removed = self.entries.remove_if(key, |_, e| e.is_expired_at(now));
            if removed.is_some() {
                lru.remove(key);
            }
            removed
        };

        match removed {
            Some((_, entry)) => {
                self.untag(key, entry.tags.iter());
                true
            }
            None => false,
        }
    }

    // == Tags ==
    /// Detaches and returns every key recorded under `tag`.
    pub fn take_tag(&self, tag: &str) -> HashSet<String> {
        self.tags.remove(tag).map(|(_, keys)| keys).unwrap_or_default()
    }

    pub fn tag_members(&self, tag: &str) -> HashSet<String> {
        self.tags.get(tag).map(|keys| keys.value().clone()).unwrap_or_default()
    }

    fn untag<'a>(&self, key: &str, tags: impl Iterator<Item = &'a String>) {
        for tag in tags {
            let now_empty = match self.tags.get_mut(tag) {
                Some(mut keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.tags.remove_if(tag, |_, keys| keys.is_empty());
            }
        }
    }

    // == Purge Expired ==
    /// Removes expired entries and drops dead keys from the tag index.
    ///
    /// Works shard by shard: candidates are collected under read guards,
    /// then each is removed under its own short write guard, re-checking
    /// expiry so a concurrent overwrite survives.
    pub fn purge_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let candidates: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired_at(now))
            .map(|e| e.key().clone())
            .collect();

        let removed = candidates
            .iter()
            .filter(|key| self.remove_if_expired(key, now))
            .count();

        self.prune_tags();
        removed
    }

    /// Drops tag memberships whose key no longer has an entry.
    pub fn prune_tags(&self) {
        self.tags.retain(|_, keys| {
            keys.retain(|k| self.entries.contains_key(k));
            !keys.is_empty()
        });
    }

    pub fn clear(&self) {
        let mut lru = self.lru.lock();
        self.entries.clear();
        self.tags.clear();
        lru.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    fn entry(value: Value, ttl: u64, tags: &[&str]) -> CacheEntry {
        CacheEntry::new(value, ttl, tags.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_insert_and_get() {
        let layer = MemoryLayer::new(10);
        layer.insert("item:1", entry(json!({"n": 1}), 60, &[]));

        assert_eq!(layer.get("item:1"), Lookup::Hit(json!({"n": 1})));
        assert_eq!(layer.get("item:2"), Lookup::Missing);
    }

    #[test]
    fn test_lazy_expiry_on_read() {
        let layer = MemoryLayer::new(10);
        layer.insert("short", entry(json!("v"), 1, &["t"]));

        sleep(Duration::from_millis(1100));

        assert_eq!(layer.get("short"), Lookup::Expired);
        assert_eq!(layer.get("short"), Lookup::Missing);
        assert!(layer.tag_members("t").is_empty());
    }

    #[test]
    fn test_expired_removal_spares_a_fresh_overwrite() {
        let layer = MemoryLayer::new(10);
        let read_at = current_timestamp_ms();
        layer.insert("k", CacheEntry::with_ttl_ms(json!("old"), 0, HashSet::new()));
        layer.insert("k", entry(json!("fresh"), 60, &["t"]));

        // a reader that saw the old value expired at `read_at` comes back late
        assert!(!layer.remove_if_expired("k", read_at));
        assert_eq!(layer.get("k"), Lookup::Hit(json!("fresh")));
        assert!(layer.tag_members("t").contains("k"));
    }

    #[test]
    fn test_remove_if_expired_drops_stale_entry() {
        let layer = MemoryLayer::new(10);
        layer.insert("k", CacheEntry::with_ttl_ms(json!(1), 0, ["t".to_string()].into()));

        assert!(layer.remove_if_expired("k", current_timestamp_ms()));
        assert!(layer.is_empty());
        assert!(layer.tag_members("t").is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let layer = MemoryLayer::new(3);
        layer.insert("a", entry(json!(1), 60, &["grp"]));
        layer.insert("b", entry(json!(2), 60, &[]));
        layer.insert("c", entry(json!(3), 60, &[]));
        layer.get("a");

        let evicted = layer.insert("d", entry(json!(4), 60, &[]));

        assert_eq!(evicted, Some("b".to_string()));
        assert_eq!(layer.len(), 3);
        assert_eq!(layer.get("b"), Lookup::Missing);
        assert!(layer.tag_members("grp").contains("a"));
    }

    #[test]
    fn test_overwrite_moves_tags() {
        let layer = MemoryLayer::new(10);
        layer.insert("k", entry(json!(1), 60, &["old", "kept"]));
        layer.insert("k", entry(json!(2), 60, &["kept", "new"]));

        assert!(layer.tag_members("old").is_empty());
        assert!(layer.tag_members("kept").contains("k"));
        assert!(layer.tag_members("new").contains("k"));
        assert_eq!(layer.get("k"), Lookup::Hit(json!(2)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let layer = MemoryLayer::new(10);
        layer.insert("k", entry(json!(1), 60, &["t"]));

        assert!(layer.remove("k"));
        assert!(!layer.remove("k"));
        assert_eq!(layer.tag_count(), 0);
    }

    #[test]
    fn test_take_tag_detaches_index() {
        let layer = MemoryLayer::new(10);
        layer.insert("k1", entry(json!(1), 60, &["room:5"]));
        layer.insert("k2", entry(json!(2), 60, &["room:5"]));

        let keys = layer.take_tag("room:5");
        assert_eq!(keys.len(), 2);
        assert!(layer.take_tag("room:5").is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let layer = MemoryLayer::new(10);
        layer.insert("short", entry(json!(1), 1, &["t"]));
        layer.insert("long", entry(json!(2), 60, &["t"]));

        sleep(Duration::from_millis(1100));

        assert_eq!(layer.purge_expired(), 1);
        assert_eq!(layer.len(), 1);
        let members = layer.tag_members("t");
        assert_eq!(members.len(), 1);
        assert!(members.contains("long"));
    }
}
