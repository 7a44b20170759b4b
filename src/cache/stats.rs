//! Cache Statistics Module
//!
//! Tracks tiered cache performance: hits per layer, misses, writes and
//! distributed-layer errors.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of the tiered cache counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CacheStats {
    /// Reads answered by the in-process layer
    pub l1_hits: u64,
    /// Reads answered by the distributed layer
    pub l2_hits: u64,
    /// Reads answered by neither layer
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Distributed-layer calls that failed, timed out or were short-circuited
    pub l2_errors: u64,
    /// Keys removed through tag invalidation
    pub invalidations: u64,
    /// L1 entries evicted due to LRU policy
    pub evictions: u64,
    /// L1 entries removed by lazy expiry or the reaper
    pub expired: u64,
    /// Current number of entries in L1
    pub l1_entries: usize,
    /// Whether the last distributed-layer call succeeded
    pub redis_connected: bool,
    pub hit_rate: f64,
}

impl CacheStats {
    /// Calculates (l1_hits + l2_hits) / reads, or 0.0 with no reads yet.
    pub fn compute_hit_rate(&self) -> f64 {
        let hits = self.l1_hits + self.l2_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// == Counters ==
/// Lock-free counters shared by every clone of the cache.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub l1_hits: AtomicU64,
    pub l2_hits: AtomicU64,
    pub misses: AtomicU64,
    pub sets: AtomicU64,
    pub deletes: AtomicU64,
    pub l2_errors: AtomicU64,
    pub invalidations: AtomicU64,
    pub evictions: AtomicU64,
    pub expired: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, l1_entries: usize, redis_connected: bool) -> CacheStats {
        let mut stats = CacheStats {
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            l2_errors: self.l2_errors.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            l1_entries,
            redis_connected,
            hit_rate: 0.0,
        };
        stats.hit_rate = stats.compute_hit_rate();
        stats
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = StatsCounters::default().snapshot(0, false);
        assert_eq!(stats.hit_rate, 0.0);
        assert!(!stats.redis_connected);
    }

    #[test]
    fn test_hit_rate_counts_both_layers() {
        let counters = StatsCounters::default();
        StatsCounters::incr(&counters.l1_hits);
        StatsCounters::incr(&counters.l2_hits);
        StatsCounters::incr(&counters.misses);
        StatsCounters::incr(&counters.misses);

        let stats = counters.snapshot(3, true);
        assert_eq!(stats.hit_rate, 0.5);
        assert_eq!(stats.l1_entries, 3);
    }

    #[test]
    fn test_add_accumulates() {
        let counters = StatsCounters::default();
        StatsCounters::add(&counters.invalidations, 4);
        StatsCounters::add(&counters.invalidations, 2);
        assert_eq!(counters.snapshot(0, true).invalidations, 6);
    }
}
