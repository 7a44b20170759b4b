//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the L1 layer can hold
    pub max_entries: usize,
    /// Default TTL in seconds for entries without explicit TTL or data type
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Connection string for the distributed layer; None runs L1 only
    pub redis_url: Option<String>,
    /// Prefix applied to every key written to Redis
    pub redis_key_prefix: String,
    /// Upper bound in milliseconds for a single L2 round trip
    pub l2_timeout_ms: u64,
    /// Optional namespace prepended to every cache key
    pub key_namespace: Option<String>,
    /// Keys longer than this are replaced by a hashed form
    pub max_key_length: usize,
    /// Serialized size in bytes above which compression kicks in
    pub compression_threshold: usize,
    /// TTL in seconds for values promoted from L2 into L1
    pub l1_promotion_ttl: u64,
    /// Maximum selection nesting accepted by the query governor
    pub max_query_depth: usize,
    /// Maximum complexity score accepted by the query governor
    pub max_query_complexity: u64,
    /// Number of complexity scores kept in the governor's score cache
    pub score_cache_size: usize,
    /// Operations slower than this are logged as slow
    pub slow_threshold_ms: u64,
    /// Consecutive failures that open a circuit
    pub circuit_max_failures: u32,
    /// Seconds an open circuit waits before letting a probe through
    pub circuit_reset_timeout: u64,
    /// Per data type TTL overrides, in seconds
    pub ttl_overrides: HashMap<String, u64>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum L1 entries (default: 10000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 1)
    /// - `REDIS_URL` - Redis connection string (default: unset)
    /// - `REDIS_KEY_PREFIX` - Prefix for Redis keys (default: "cgov:")
    /// - `L2_TIMEOUT_MS` - Timeout per L2 operation (default: 250)
    /// - `KEY_NAMESPACE` - Key namespace (default: unset)
    /// - `MAX_KEY_LENGTH` - Hashing threshold for keys (default: 250)
    /// - `COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 1024)
    /// - `L1_PROMOTION_TTL` - TTL for L2 hits copied into L1 (default: 60)
    /// - `MAX_QUERY_DEPTH` - Query depth limit (default: 7)
    /// - `MAX_QUERY_COMPLEXITY` - Query complexity limit (default: 1000)
    /// - `SCORE_CACHE_SIZE` - Cached complexity scores (default: 512)
    /// - `SLOW_THRESHOLD_MS` - Slow operation threshold (default: 1000)
    /// - `CIRCUIT_MAX_FAILURES` - Failures before opening (default: 5)
    /// - `CIRCUIT_RESET_TIMEOUT` - Cooldown in seconds (default: 30)
    /// - `TTL_OVERRIDES` - Comma separated `type=seconds` pairs (default: empty)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            redis_key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or(defaults.redis_key_prefix),
            l2_timeout_ms: env_or("L2_TIMEOUT_MS", defaults.l2_timeout_ms),
            key_namespace: env::var("KEY_NAMESPACE").ok().filter(|v| !v.is_empty()),
            max_key_length: env_or("MAX_KEY_LENGTH", defaults.max_key_length),
            compression_threshold: env_or("COMPRESSION_THRESHOLD", defaults.compression_threshold),
            l1_promotion_ttl: env_or("L1_PROMOTION_TTL", defaults.l1_promotion_ttl),
            max_query_depth: env_or("MAX_QUERY_DEPTH", defaults.max_query_depth),
            max_query_complexity: env_or("MAX_QUERY_COMPLEXITY", defaults.max_query_complexity),
            score_cache_size: env_or("SCORE_CACHE_SIZE", defaults.score_cache_size),
            slow_threshold_ms: env_or("SLOW_THRESHOLD_MS", defaults.slow_threshold_ms),
            circuit_max_failures: env_or("CIRCUIT_MAX_FAILURES", defaults.circuit_max_failures),
            circuit_reset_timeout: env_or("CIRCUIT_RESET_TIMEOUT", defaults.circuit_reset_timeout),
            ttl_overrides: env::var("TTL_OVERRIDES")
                .map(|v| parse_ttl_overrides(&v))
                .unwrap_or_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: 300,
            server_port: 3000,
            cleanup_interval: 1,
            redis_url: None,
            redis_key_prefix: "cgov:".to_string(),
            l2_timeout_ms: 250,
            key_namespace: None,
            max_key_length: 250,
            compression_threshold: 1024,
            l1_promotion_ttl: 60,
            max_query_depth: 7,
            max_query_complexity: 1000,
            score_cache_size: 512,
            slow_threshold_ms: 1000,
            circuit_max_failures: 5,
            circuit_reset_timeout: 30,
            ttl_overrides: HashMap::new(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses `item=60,list=120` into a map. Malformed pairs are skipped.
pub fn parse_ttl_overrides(raw: &str) -> HashMap<String, u64> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, secs) = pair.split_once('=')?;
            let secs = secs.trim().parse().ok()?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), secs))
        })
        .collect()
}
