//! API Routes
//!
//! Configures the Axum router with all endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    analyze_handler, delete_handler, flush_handler, get_handler, health_handler,
    invalidate_handler, metrics_handler, mget_handler, reset_metrics_handler, set_handler,
    stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/cache", put(set_handler).delete(flush_handler))
        .route("/cache/mget", post(mget_handler))
        .route("/cache/:key", get(get_handler).delete(delete_handler))
        .route("/invalidate/:tag", post(invalidate_handler))
        .route("/query/analyze", post(analyze_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler).delete(reset_metrics_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
