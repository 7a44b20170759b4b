//! Distributed (L2) store abstraction.
//!
//! The tiered cache only talks to L2 through [`DistributedStore`]. Any
//! error returned here is a connectivity-class failure: the caller logs it
//! and carries on with L1 only.
//!
//! Data values and tag sets live in separate keyspaces: a data key can
//! never collide with the index set of a tag, whatever its name.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

/// A payload read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPayload {
    pub bytes: Vec<u8>,
    /// Time left before the store expires the value; `None` if it never does
    pub ttl: Option<Duration>,
}

impl StoredPayload {
    pub fn new(bytes: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self { bytes, ttl }
    }
}

#[async_trait]
pub trait DistributedStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<StoredPayload>>;

    async fn set(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()>;

    /// Deletes each data key. Returns, per input key, whether it existed.
    async fn delete(&self, keys: &[String]) -> Result<Vec<bool>>;

    /// Batch read; one slot per input key, in input order.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<StoredPayload>>>;

    /// Adds `member` to the index set of `tag`, extending the set's expiry
    /// to at least `ttl`.
    async fn tag_add(&self, tag: &str, member: &str, ttl: Duration) -> Result<()>;

    async fn tag_members(&self, tag: &str) -> Result<Vec<String>>;

    /// Drops the index set of `tag`. Returns whether it existed.
    async fn tag_delete(&self, tag: &str) -> Result<bool>;

    async fn ping(&self) -> Result<()>;

    /// Removes everything this store owns.
    async fn flush(&self) -> Result<()>;
}
