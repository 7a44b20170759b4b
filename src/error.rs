//! Error types for the caching and query-governance layer
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache, governor and breaker components.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Distributed layer unreachable. Recovered inside the tiered cache by
    /// falling back to L1-only behavior.
    #[error("Distributed cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Query nesting deeper than the budget allows
    #[error("Query depth {depth} exceeds maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },

    /// Query cost above the budget
    #[error("Query complexity {score} exceeds maximum of {max}")]
    ComplexityExceeded { score: u64, max: u64 },

    /// Guarded dependency is failing; caller should back off
    #[error("Circuit '{name}' is open, retry after {}ms", .retry_after.as_millis())]
    CircuitOpen { name: String, retry_after: Duration },

    /// Cached payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    System(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),
}

impl CacheError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::CircuitOpen { .. } | CacheError::System(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let retryable = self.is_retryable();

        let (status, retry_after) = match &self {
            CacheError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            CacheError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, None),
            CacheError::DepthExceeded { .. } | CacheError::ComplexityExceeded { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, None)
            }
            CacheError::CircuitOpen { retry_after, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, Some(retry_after.as_secs().max(1)))
            }
            CacheError::CacheUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            CacheError::Serialization(_) | CacheError::System(_) => {
                tracing::error!(error = %message, "request failed with internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = match retry_after {
            Some(secs) => json!({
                "error": message,
                "retryable": retryable,
                "retry_after_secs": secs,
            }),
            None => json!({
                "error": message,
                "retryable": retryable,
            }),
        };

        (status, Json(body)).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let open = CacheError::CircuitOpen {
            name: "billing".to_string(),
            retry_after: Duration::from_secs(5),
        };
        assert!(open.is_retryable());
        assert!(CacheError::System("boom".to_string()).is_retryable());
        assert!(!CacheError::DepthExceeded { depth: 8, max: 7 }.is_retryable());
        assert!(!CacheError::ComplexityExceeded { score: 10, max: 5 }.is_retryable());
    }

    #[test]
    fn test_status_codes() {
        let resp = CacheError::NotFound("k".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = CacheError::DepthExceeded { depth: 8, max: 7 }.into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = CacheError::CircuitOpen {
            name: "x".to_string(),
            retry_after: Duration::from_millis(200),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_display_messages() {
        let err = CacheError::ComplexityExceeded { score: 1200, max: 1000 };
        assert_eq!(
            err.to_string(),
            "Query complexity 1200 exceeds maximum of 1000"
        );
    }
}
