//! Redis backend for the distributed layer.
//!
//! Data values are plain STRING keys written with `SET .. EX` under
//! `{prefix}d:`; tag indexes are Redis SETs under `{prefix}t:`. The shared
//! prefix lets a shared Redis instance be flushed without touching other
//! tenants.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::info;

use super::{DistributedStore, StoredPayload};
use crate::error::{CacheError, Result};

const SCAN_BATCH: usize = 500;
const DATA_SPACE: &str = "d:";
const TAG_SPACE: &str = "t:";

pub struct RedisStore {
    connection: ConnectionManager,
    prefix: String,
}

fn unavailable(e: redis::RedisError) -> CacheError {
    CacheError::CacheUnavailable(e.to_string())
}

/// PTTL reply to a remaining lifetime: -1 is no expiry, -2 means the key
/// expired after it was read.
fn remaining(pttl_ms: i64) -> Option<Duration> {
    match pttl_ms {
        -1 => None,
        ms => Some(Duration::from_millis(u64::try_from(ms).unwrap_or(0))),
    }
}

impl RedisStore {
    /// Connects to Redis. Fails if the first connection cannot be made.
    pub async fn connect(connection_string: &str, prefix: &str) -> Result<Self> {
        let client = Client::open(connection_string).map_err(unavailable)?;
        let connection = ConnectionManager::new(client).await.map_err(unavailable)?;
        info!(prefix = %prefix, "connected to redis");

        Ok(Self {
            connection,
            prefix: prefix.to_string(),
        })
    }

    #[inline]
    fn data_key(&self, key: &str) -> String {
        format!("{}{DATA_SPACE}{}", self.prefix, key)
    }

    #[inline]
    fn tag_key(&self, tag: &str) -> String {
        format!("{}{TAG_SPACE}{}", self.prefix, tag)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl DistributedStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<StoredPayload>> {
        let mut conn = self.connection.clone();
        let key = self.data_key(key);
        let (bytes, pttl): (Option<Vec<u8>>, i64) = redis::pipe()
            .atomic()
            .get(&key)
            .pttl(&key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(bytes.map(|bytes| StoredPayload::new(bytes, remaining(pttl))))
    }

    async fn set(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let secs = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(self.data_key(key), payload, secs)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        let mut pipeline = redis::pipe();
        for key in keys {
            pipeline.del(self.data_key(key));
        }
        let counts: Vec<u64> = pipeline.query_async(&mut conn).await.map_err(unavailable)?;
        Ok(counts.into_iter().map(|n| n > 0).collect())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<StoredPayload>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        let prefixed: Vec<String> = keys.iter().map(|k| self.data_key(k)).collect();

        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(&prefixed)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        let mut ttl_pipeline = redis::pipe();
        for key in &prefixed {
            ttl_pipeline.pttl(key);
        }
        let pttls: Vec<i64> = ttl_pipeline
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(values
            .into_iter()
            .zip(pttls)
            .map(|(bytes, pttl)| bytes.map(|b| StoredPayload::new(b, remaining(pttl))))
            .collect())
    }

    async fn tag_add(&self, tag: &str, member: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let key = self.tag_key(tag);
        let secs = ttl.as_secs().max(1) as i64;

        let (_, current_ttl): (u64, i64) = redis::pipe()
            .sadd(&key, member)
            .ttl(&key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        // -1: no expiry yet. Never shorten a set that outlives this member.
        if current_ttl < secs {
            let _: () = conn.expire(&key, secs).await.map_err(unavailable)?;
        }
        Ok(())
    }

    async fn tag_members(&self, tag: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        conn.smembers(self.tag_key(tag)).await.map_err(unavailable)
    }

    async fn tag_delete(&self, tag: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let removed: u64 = conn.del(self.tag_key(tag)).await.map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            if !batch.is_empty() {
                let _: () = conn.del(batch).await.map_err(unavailable)?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pttl_replies() {
        assert_eq!(remaining(-1), None);
        assert_eq!(remaining(-2), Some(Duration::ZERO));
        assert_eq!(remaining(1500), Some(Duration::from_millis(1500)));
    }
}
