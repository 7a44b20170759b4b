//! Resilience Module
//!
//! Circuit breaking for calls to unreliable downstream dependencies.

mod circuit_breaker;
mod registry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitConfig, CircuitError, CircuitSnapshot, CircuitState,
};
pub use registry::CircuitBreakerRegistry;
