//! Cache Entry Module
//!
//! Defines the structure for individual L1 entries with TTL and tag support.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

// == Cache Entry ==
/// A single L1 entry: the live (uncompressed) value plus its metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Tags this entry was stored with
    pub tags: HashSet<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl_seconds` from now.
    pub fn new(value: Value, ttl_seconds: u64, tags: HashSet<String>) -> Self {
        Self::with_ttl_ms(value, ttl_seconds.saturating_mul(1000), tags)
    }

    /// Creates a new cache entry expiring `ttl_ms` milliseconds from now.
    pub fn with_ttl_ms(value: Value, ttl_ms: u64, tags: HashSet<String>) -> Self {
        let now = current_timestamp_ms();
        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            tags,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once the current time is
    /// greater than or equal to `expires_at`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Expiry check against a caller-supplied clock reading, so a sweep can
    /// use one timestamp for the whole pass.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }

    /// Returns remaining TTL in whole seconds.
    pub fn ttl_remaining(&self) -> u64 {
        self.ttl_remaining_ms() / 1000
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(json!({"name": "widget"}), 60, HashSet::new());

        assert_eq!(entry.value["name"], "widget");
        assert!(!entry.is_expired());
        assert!(entry.expires_at >= entry.created_at + 60_000);
    }

    #[test]
    fn test_entry_keeps_tags() {
        let tags: HashSet<String> = ["room:5".to_string()].into_iter().collect();
        let entry = CacheEntry::new(json!(1), 60, tags);
        assert!(entry.tags.contains("room:5"));
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(json!("v"), 1, HashSet::new());

        assert!(!entry.is_expired());

        sleep(Duration::from_millis(1100));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining_ms(), 0);
    }

    #[test]
    fn test_ttl_remaining_seconds() {
        let entry = CacheEntry::new(json!("v"), 10, HashSet::new());

        let remaining = entry.ttl_remaining();
        assert!(remaining <= 10);
        assert!(remaining >= 9);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let entry = CacheEntry {
            value: json!("test"),
            created_at: now,
            expires_at: now,
            tags: HashSet::new(),
        };

        assert!(entry.is_expired(), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(now - 1));
    }
}
