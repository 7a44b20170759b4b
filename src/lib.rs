//! Cache Governor - tiered caching and query governance
//!
//! An in-process L1 cache in front of an optional Redis L2, with tag
//! invalidation, a static query depth/complexity governor, circuit
//! breaking for downstream calls and per-operation performance metrics.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod governor;
pub mod health;
pub mod models;
pub mod monitor;
pub mod policy;
pub mod resilience;
pub mod tasks;

pub use api::AppState;
pub use cache::{SetOptions, TieredCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use governor::{ComplexityBudget, QueryGovernor};
pub use monitor::PerformanceMonitor;
pub use resilience::{CircuitBreaker, CircuitBreakerRegistry};
pub use tasks::{spawn_cleanup_task, spawn_distributed_connector};
