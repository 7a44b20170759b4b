//! Health reporting.
//!
//! Combines a set/get/delete round trip through the cache, an L2 ping and
//! the state of every circuit breaker into one overall status.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::cache::{current_timestamp_ms, SetOptions, TieredCache};
use crate::resilience::{CircuitBreakerRegistry, CircuitSnapshot};

const PROBE_PREFIX: &str = "__health:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub ok: bool,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributedHealth {
    pub configured: bool,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub cache_probe: ProbeResult,
    pub distributed: DistributedHealth,
    pub circuits: Vec<CircuitSnapshot>,
}

/// Runs a set/get/delete cycle on a throwaway key.
pub async fn probe_cache(cache: &TieredCache) -> ProbeResult {
    let started = Instant::now();
    let stamp = current_timestamp_ms();
    let key = format!("{PROBE_PREFIX}{stamp}");
    let expected = json!({ "probe": stamp });

    let written = cache.set(&key, &expected, SetOptions::new().ttl(10)).await.is_ok();
    let read_back = cache.get_value(&key).await;
    cache.delete(&key).await;

    let ok = written && read_back.as_ref() == Some(&expected);
    if !ok {
        warn!(key = %key, "cache liveness probe failed");
    }
    ProbeResult {
        ok,
        latency_ms: started.elapsed().as_millis() as u64,
    }
}

/// Builds the full report.
///
/// Unhealthy when the cache round trip fails. Degraded when L2 is
/// configured but unreachable or not yet attached, or when any circuit is
/// not closed.
pub async fn check(cache: &TieredCache, circuits: &CircuitBreakerRegistry) -> HealthReport {
    let cache_probe = probe_cache(cache).await;
    let configured = cache.distributed_configured();
    let connected = configured && cache.ping().await;

    let status = if !cache_probe.ok {
        HealthStatus::Unhealthy
    } else if (configured && !connected) || circuits.any_open() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthReport {
        status,
        checked_at: Utc::now(),
        cache_probe,
        distributed: DistributedHealth {
            configured,
            connected,
        },
        circuits: circuits.snapshot(),
    }
}
