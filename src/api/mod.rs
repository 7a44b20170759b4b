//! API Module
//!
//! HTTP handlers and routing over the cache, the query governor and the
//! monitoring components.
//!
//! # Endpoints
//! - `PUT /cache` - Store a value (TTL, data type, tags, compression)
//! - `GET /cache/:key` - Retrieve a value by key
//! - `DELETE /cache/:key` - Delete a key
//! - `DELETE /cache` - Flush both layers
//! - `POST /cache/mget` - Batch read
//! - `POST /invalidate/:tag` - Delete every key carrying a tag
//! - `POST /query/analyze` - Depth and complexity check for a query
//! - `GET /stats` - Cache, score cache and circuit statistics
//! - `GET /metrics` / `DELETE /metrics` - Per-operation metrics
//! - `GET /health` - Health report

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
