//! Key construction and per-payload storage policy.

use sha2::{Digest, Sha256};

use super::ttl::TtlTable;
use crate::config::Config;

/// Prefix marking a key that was replaced by its digest.
pub const HASHED_KEY_PREFIX: &str = "hashed:";

// == Key Policy ==
/// Deterministic key construction plus TTL and compression decisions.
#[derive(Debug, Clone)]
pub struct KeyPolicy {
    namespace: Option<String>,
    max_key_length: usize,
    compression_threshold: usize,
    ttl: TtlTable,
}

impl KeyPolicy {
    pub fn new(
        namespace: Option<String>,
        max_key_length: usize,
        compression_threshold: usize,
        ttl: TtlTable,
    ) -> Self {
        Self {
            namespace,
            max_key_length,
            compression_threshold,
            ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.key_namespace.clone(),
            config.max_key_length,
            config.compression_threshold,
            TtlTable::new(config.default_ttl).with_overrides(&config.ttl_overrides),
        )
    }

    // == Build Key ==
    /// Joins namespace and raw key with `:`. An explicit `namespace` wins
    /// over the configured default.
    ///
    /// Keys longer than `max_key_length` become `hashed:<sha256 hex>` of the
    /// full joined key, so distinct namespaces never collide and the result
    /// is always 71 characters.
    pub fn build_key(&self, raw_key: &str, namespace: Option<&str>) -> String {
        let joined = match namespace.or(self.namespace.as_deref()) {
            Some(ns) if !ns.is_empty() => format!("{ns}:{raw_key}"),
            _ => raw_key.to_string(),
        };

        if joined.len() > self.max_key_length {
            let digest = Sha256::digest(joined.as_bytes());
            format!("{HASHED_KEY_PREFIX}{}", hex::encode(digest))
        } else {
            joined
        }
    }

    // == Select TTL ==
    /// TTL in seconds for a data category; unknown categories get the
    /// configured default.
    pub fn select_ttl(&self, data_type: &str) -> u64 {
        self.ttl.ttl_for(data_type)
    }

    pub fn default_ttl(&self) -> u64 {
        self.ttl.fallback()
    }

    // == Should Compress ==
    /// Compression only pays off above the threshold.
    pub fn should_compress(&self, serialized_size: usize) -> bool {
        serialized_size > self.compression_threshold
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
