//! Cache Module
//!
//! Two-level caching: an in-process L1 layer with TTL expiration, LRU
//! eviction and a local tag index, in front of an optional distributed L2
//! layer with tag sets and optional gzip payloads.

pub mod codec;
pub mod distributed;
mod entry;
mod lru;
mod memory;
mod stats;
mod tiered;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use distributed::{DistributedStore, InMemoryStore, RedisStore, StoredPayload};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use lru::LruTracker;
pub use memory::{Lookup, MemoryLayer};
pub use stats::CacheStats;
pub use tiered::{SetOptions, TieredCache, L2_CIRCUIT};
