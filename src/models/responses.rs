//! Response DTOs for the HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;
use crate::governor::{ComplexityBudget, QueryCost, ScoreCacheStats};
use crate::resilience::CircuitSnapshot;

/// Response body for GET /cache/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The effective cache key
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for PUT /cache
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The effective cache key the value was stored under
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /cache/:key
///
/// Deleting an absent key is not an error; `deleted` is false.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub key: String,
    pub deleted: bool,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, deleted: bool) -> Self {
        Self {
            key: key.into(),
            deleted,
        }
    }
}

/// Response body for POST /cache/mget: one slot per requested key, in
/// request order, `null` where absent.
#[derive(Debug, Clone, Serialize)]
pub struct MGetResponse {
    pub keys: Vec<String>,
    pub values: Vec<Option<Value>>,
    pub found: usize,
}

impl MGetResponse {
    pub fn new(keys: Vec<String>, values: Vec<Option<Value>>) -> Self {
        let found = values.iter().filter(|v| v.is_some()).count();
        Self {
            keys,
            values,
            found,
        }
    }
}

/// Response body for POST /invalidate/:tag
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub tag: String,
    pub invalidated: usize,
}

/// Response body for DELETE /cache
#[derive(Debug, Clone, Serialize)]
pub struct FlushResponse {
    pub message: String,
}

impl FlushResponse {
    pub fn flushed() -> Self {
        Self {
            message: "Cache flushed".to_string(),
        }
    }
}

/// Response body for POST /query/analyze
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub accepted: bool,
    pub depth: usize,
    pub complexity: u64,
    pub budget: ComplexityBudget,
}

impl AnalyzeResponse {
    pub fn accepted(cost: QueryCost, budget: ComplexityBudget) -> Self {
        Self {
            accepted: true,
            depth: cost.depth,
            complexity: cost.complexity,
            budget,
        }
    }
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub score_cache: ScoreCacheStats,
    pub circuits: Vec<CircuitSnapshot>,
}
