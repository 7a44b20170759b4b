//! Circuit Breaker Module
//!
//! Guards calls to unreliable dependencies. After `max_failures`
//! consecutive failures the circuit opens and calls fail fast with a
//! retry hint; once `reset_timeout` has elapsed a single probe call is let
//! through. A successful probe closes the circuit, a failed one reopens it.
//!
//! States:
//! - Closed: normal operation, calls pass through
//! - Open: dependency unhealthy, calls are rejected without running
//! - HalfOpen: exactly one probe call in flight, everyone else rejected

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CacheError;

// == Circuit State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

// == Circuit Error ==
/// Error type for circuit-protected operations.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The breaker rejected the call without running it
    #[error("circuit open, retry after {}ms", .retry_after.as_millis())]
    Open { retry_after: Duration },

    /// The underlying operation failed
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

// == Circuit Config ==
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Consecutive failures that trip the circuit
    pub max_failures: u32,
    /// How long the circuit stays open before a probe is allowed
    pub reset_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitConfig {
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            reset_timeout,
        }
    }
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub calls_total: u64,
    pub rejections: u64,
}

#[derive(Debug)]
struct Transitions {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    last_failure_wall: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

// == Circuit Breaker ==
/// A named circuit breaker. All state transitions happen under one short
/// mutex; the guarded operation itself runs without holding it.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<Transitions>,
    calls_total: AtomicU64,
    rejections: AtomicU64,
}

/// Admission ticket for one call. A probe that is dropped before it
/// reports back frees the half-open slot so the circuit cannot wedge.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            let mut inner = self.breaker.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.probe_in_flight = false;
            }
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Transitions {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                last_failure_wall: None,
                probe_in_flight: false,
            }),
            calls_total: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Current state. An open circuit whose cooldown has elapsed still
    /// reports `Open` until the next call turns it into a probe.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failure_count,
            last_failure: inner.last_failure_wall,
            calls_total: self.calls_total.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }

    // == Execute ==
    /// Runs `f` through the breaker.
    ///
    /// Takes a closure returning the future so that a rejected call never
    /// constructs (let alone polls) the operation.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut admission = match self.admit() {
            Ok(admission) => admission,
            Err(retry_after) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, retry_after_ms = retry_after.as_millis() as u64, "circuit rejected call");
                return Err(CircuitError::Open { retry_after });
            }
        };
        self.calls_total.fetch_add(1, Ordering::Relaxed);

        let result = f().await;
        admission.settled = true;

        match result {
            Ok(value) => {
                self.on_success(admission.probe);
                Ok(value)
            }
            Err(e) => {
                self.on_failure(admission.probe);
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Like [`execute`](Self::execute) but flattens into the crate error.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> crate::error::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<CacheError>,
    {
        self.execute(f).await.map_err(|err| match err {
            CircuitError::Open { retry_after } => CacheError::CircuitOpen {
                name: self.name.clone(),
                retry_after,
            },
            CircuitError::Inner(e) => e.into(),
        })
    }

    fn admit(&self) -> Result<Admission<'_>, Duration> {
        let mut inner = self.inner.lock();
        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.reset_timeout);
                if elapsed < self.config.reset_timeout {
                    return Err(self.config.reset_timeout - elapsed);
                }
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                info!(circuit = %self.name, "circuit half-open, letting probe through");
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(self.config.reset_timeout);
                }
                inner.probe_in_flight = true;
                true
            }
        };

        Ok(Admission {
            breaker: self,
            probe,
            settled: false,
        })
    }

    /// Only the probe settles a half-open circuit. Calls admitted before the
    /// circuit opened count toward nothing once it has left `Closed`.
    fn on_success(&self, probe: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen if probe => {
                info!(circuit = %self.name, "probe succeeded, circuit closed");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.probe_in_flight = false;
            }
            CircuitState::Closed => inner.failure_count = 0,
            _ => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.inner.lock();
        let counts = match inner.state {
            CircuitState::HalfOpen => probe,
            CircuitState::Closed => true,
            CircuitState::Open => false,
        };
        if !counts {
            return;
        }

        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());
        inner.last_failure_wall = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.probe_in_flight = false;
                warn!(circuit = %self.name, "probe failed, circuit reopened");
            }
            CircuitState::Closed if inner.failure_count >= self.config.max_failures => {
                inner.state = CircuitState::Open;
                warn!(
                    circuit = %self.name,
                    failures = inner.failure_count,
                    "failure threshold reached, circuit opened"
                );
            }
            _ => {}
        }
    }
}
