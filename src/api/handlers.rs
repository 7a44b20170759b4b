//! API Handlers
//!
//! HTTP request handlers for each endpoint. Every cache and governor call
//! is timed into the performance monitor.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::cache::{DistributedStore, TieredCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::governor::{ComplexityBudget, QueryGovernor};
use crate::health::{self, HealthReport};
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, DeleteResponse, FlushResponse, GetResponse,
    InvalidateResponse, MGetRequest, MGetResponse, NamespaceQuery, SetRequest, SetResponse,
    StatsResponse,
};
use crate::monitor::{MetricsSnapshot, PerformanceMonitor};
use crate::resilience::CircuitBreakerRegistry;

/// Application state shared across all handlers.
///
/// Built once at startup; every field is cheap to clone and shared.
#[derive(Clone)]
pub struct AppState {
    pub cache: TieredCache,
    pub governor: Arc<QueryGovernor>,
    pub monitor: Arc<PerformanceMonitor>,
    pub circuits: Arc<CircuitBreakerRegistry>,
    /// Budget applied when a request does not override it
    pub budget: ComplexityBudget,
}

impl AppState {
    /// Wires every component from configuration. `l2` is the distributed
    /// store, if one is available.
    pub fn from_config(config: &Config, l2: Option<Arc<dyn DistributedStore>>) -> Self {
        let circuits = Arc::new(CircuitBreakerRegistry::new());
        let cache = TieredCache::from_config(config, l2, &circuits);
        Self {
            cache,
            governor: Arc::new(QueryGovernor::from_config(config)),
            monitor: Arc::new(PerformanceMonitor::from_config(config)),
            circuits,
            budget: ComplexityBudget::from_config(config),
        }
    }
}

/// Handler for PUT /cache
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let key = state.cache.key(&req.key, req.namespace.as_deref());
    let options = req.options();
    state
        .monitor
        .track("cache.set", state.cache.set_value(&key, req.value, options), |_| false)
        .await;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for GET /cache/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<NamespaceQuery>,
) -> Result<Json<GetResponse>> {
    let key = state.cache.key(&key, params.namespace.as_deref());
    let value = state
        .monitor
        .track("cache.get", state.cache.get_value(&key), Option::is_some)
        .await
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<NamespaceQuery>,
) -> Json<DeleteResponse> {
    let key = state.cache.key(&key, params.namespace.as_deref());
    let deleted = state
        .monitor
        .track("cache.delete", state.cache.delete(&key), |_| false)
        .await;

    Json(DeleteResponse::new(key, deleted))
}

/// Handler for POST /cache/mget
pub async fn mget_handler(
    State(state): State<AppState>,
    Json(req): Json<MGetRequest>,
) -> Result<Json<MGetResponse>> {
    if req.keys.iter().any(|k| k.is_empty()) {
        return Err(CacheError::InvalidRequest("Keys cannot be empty".to_string()));
    }

    let keys: Vec<String> = req
        .keys
        .iter()
        .map(|k| state.cache.key(k, req.namespace.as_deref()))
        .collect();
    let values = state
        .monitor
        .track("cache.mget", state.cache.mget::<Value>(&keys), |values| {
            !values.is_empty() && values.iter().all(Option::is_some)
        })
        .await;

    Ok(Json(MGetResponse::new(req.keys, values)))
}

/// Handler for POST /invalidate/:tag
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Json<InvalidateResponse> {
    let invalidated = state
        .monitor
        .track("cache.invalidate", state.cache.invalidate_by_tag(&tag), |_| false)
        .await;

    Json(InvalidateResponse { tag, invalidated })
}

/// Handler for DELETE /cache
pub async fn flush_handler(State(state): State<AppState>) -> Json<FlushResponse> {
    state.cache.flush().await;
    Json(FlushResponse::flushed())
}

/// Handler for POST /query/analyze
///
/// Rejections come back as 422 with the measured value and the limit.
pub async fn analyze_handler(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>> {
    let budget = req.budget(state.budget);
    let started = Instant::now();
    let outcome = state.governor.enforce(&req.query, &req.variables, budget);
    state.monitor.record(
        "query.analyze",
        started.elapsed(),
        false,
        outcome.as_ref().ok().map(|cost| cost.complexity),
    );

    Ok(Json(AnalyzeResponse::accepted(outcome?, budget)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        cache: state.cache.stats(),
        score_cache: state.governor.cache_stats(),
        circuits: state.circuits.snapshot(),
    })
}

/// Handler for GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.monitor.snapshot())
}

/// Handler for DELETE /metrics
pub async fn reset_metrics_handler(State(state): State<AppState>) -> StatusCode {
    state.monitor.reset();
    StatusCode::NO_CONTENT
}

/// Handler for GET /health
///
/// 200 for healthy and degraded, 503 for unhealthy.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = health::check(&state.cache, &state.circuits).await;
    let status = if report.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStore;
    use serde_json::json;

    fn test_state() -> AppState {
        AppState::from_config(&Config::default(), None)
    }

    fn set_request(value: Value) -> SetRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state();

        let req = set_request(json!({"key": "test_key", "value": {"n": 1}}));
        let result = set_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let response = get_handler(
            State(state.clone()),
            Path("test_key".to_string()),
            Query(NamespaceQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(response.value, json!({"n": 1}));

        let get_metrics = state.monitor.operation("cache.get").unwrap();
        assert_eq!(get_metrics.count, 1);
        assert_eq!(get_metrics.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_namespace_applies_to_key() {
        let state = test_state();

        let req = set_request(json!({"key": "42", "value": 1, "namespace": "item"}));
        let response = set_handler(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(response.key, "item:42");

        let plain = get_handler(
            State(state.clone()),
            Path("42".to_string()),
            Query(NamespaceQuery::default()),
        )
        .await;
        assert!(matches!(plain, Err(CacheError::NotFound(_))));

        let namespaced = get_handler(
            State(state),
            Path("42".to_string()),
            Query(NamespaceQuery {
                namespace: Some("item".to_string()),
            }),
        )
        .await;
        assert!(namespaced.is_ok());
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_request() {
        let state = test_state();
        let req = set_request(json!({"key": "", "value": 1}));

        let result = set_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_delete_handler_is_idempotent() {
        let state = test_state();
        let req = set_request(json!({"key": "to_delete", "value": "v"}));
        set_handler(State(state.clone()), Json(req)).await.unwrap();

        let first = delete_handler(
            State(state.clone()),
            Path("to_delete".to_string()),
            Query(NamespaceQuery::default()),
        )
        .await;
        let second = delete_handler(
            State(state),
            Path("to_delete".to_string()),
            Query(NamespaceQuery::default()),
        )
        .await;

        assert!(first.deleted);
        assert!(!second.deleted);
    }

    #[tokio::test]
    async fn test_invalidate_handler() {
        let state = test_state();
        for key in ["a", "b"] {
            let req = set_request(json!({"key": key, "value": 1, "tags": ["room:5"]}));
            set_handler(State(state.clone()), Json(req)).await.unwrap();
        }

        let response = invalidate_handler(State(state.clone()), Path("room:5".to_string())).await;
        assert_eq!(response.invalidated, 2);

        let again = invalidate_handler(State(state), Path("room:5".to_string())).await;
        assert_eq!(again.invalidated, 0);
    }

    #[tokio::test]
    async fn test_analyze_handler_records_complexity() {
        let state = test_state();
        let req: AnalyzeRequest = serde_json::from_value(json!({
            "query": { "selections": [{ "name": "items", "list": true,
                "arguments": { "first": 5 }, "selections": [{ "name": "id" }] }] }
        }))
        .unwrap();

        let response = analyze_handler(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(response.depth, 1);
        assert_eq!(response.complexity, 10);

        let metrics = state.monitor.operation("query.analyze").unwrap();
        assert_eq!(metrics.max_complexity, 10);
    }

    #[tokio::test]
    async fn test_stats_handler_reports_distributed_state() {
        let store: Arc<dyn DistributedStore> = Arc::new(InMemoryStore::new());
        let state = AppState::from_config(&Config::default(), Some(store));

        let response = stats_handler(State(state)).await;
        assert!(response.cache.redis_connected);
        assert_eq!(response.cache.l1_hits, 0);
        assert_eq!(response.circuits.len(), 1);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let (status, report) = health_handler(State(test_state())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(report.cache_probe.ok);
    }
}
