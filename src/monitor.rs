//! Performance Monitor
//!
//! Per-operation latency, cache-hit and complexity accumulators. Calls
//! slower than the configured threshold are logged as they are recorded.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::config::Config;

// == Operation Metrics ==
/// Running totals for one operation name.
#[derive(Debug, Clone, Default)]
struct OperationMetrics {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    cache_hits: u64,
    slow_calls: u64,
    complexity_total: u64,
    complexity_samples: u64,
    max_complexity: u64,
}

impl OperationMetrics {
    fn record(&mut self, duration: Duration, cache_hit: bool, complexity: Option<u64>, slow: bool) {
        self.min = if self.count == 0 { duration } else { self.min.min(duration) };
        self.max = self.max.max(duration);
        self.count += 1;
        self.total += duration;
        if cache_hit {
            self.cache_hits += 1;
        }
        if slow {
            self.slow_calls += 1;
        }
        if let Some(score) = complexity {
            self.complexity_total = self.complexity_total.saturating_add(score);
            self.complexity_samples += 1;
            self.max_complexity = self.max_complexity.max(score);
        }
    }

    fn summary(&self) -> OperationSummary {
        let per_call = |total: f64, n: u64| if n == 0 { 0.0 } else { total / n as f64 };
        OperationSummary {
            count: self.count,
            total_ms: as_ms(self.total),
            avg_ms: per_call(as_ms(self.total), self.count),
            min_ms: as_ms(self.min),
            max_ms: as_ms(self.max),
            cache_hits: self.cache_hits,
            cache_hit_rate: per_call(self.cache_hits as f64, self.count),
            slow_calls: self.slow_calls,
            avg_complexity: per_call(self.complexity_total as f64, self.complexity_samples),
            max_complexity: self.max_complexity,
        }
    }
}

fn as_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// Read-only view of one operation's statistics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationSummary {
    pub count: u64,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub cache_hits: u64,
    pub cache_hit_rate: f64,
    pub slow_calls: u64,
    pub avg_complexity: f64,
    pub max_complexity: u64,
}

/// Point-in-time read of every operation, sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub slow_threshold_ms: u64,
    pub operations: BTreeMap<String, OperationSummary>,
}

// == Monitor ==
#[derive(Debug)]
pub struct PerformanceMonitor {
    operations: Mutex<HashMap<String, OperationMetrics>>,
    slow_threshold: Duration,
}

impl PerformanceMonitor {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
            slow_threshold,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_millis(config.slow_threshold_ms))
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Adds one call to the accumulators for `operation`.
    pub fn record(
        &self,
        operation: &str,
        duration: Duration,
        cache_hit: bool,
        complexity: Option<u64>,
    ) {
        let slow = duration > self.slow_threshold;
        if slow {
            warn!(
                operation,
                duration_ms = duration.as_millis() as u64,
                threshold_ms = self.slow_threshold.as_millis() as u64,
                cache_hit,
                complexity,
                "slow operation"
            );
        }

        let mut ops = self.operations.lock();
        match ops.get_mut(operation) {
            Some(metrics) => metrics.record(duration, cache_hit, complexity, slow),
            None => {
                let mut metrics = OperationMetrics::default();
                metrics.record(duration, cache_hit, complexity, slow);
                ops.insert(operation.to_string(), metrics);
            }
        }
    }

    /// Times `fut` and records it. `cache_hit` decides from the output
    /// whether the call was served from cache.
    pub async fn track<Fut, T>(
        &self,
        operation: &str,
        fut: Fut,
        cache_hit: impl FnOnce(&T) -> bool,
    ) -> T
    where
        Fut: Future<Output = T>,
    {
        let started = Instant::now();
        let output = fut.await;
        self.record(operation, started.elapsed(), cache_hit(&output), None);
        output
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = self
            .operations
            .lock()
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.summary()))
            .collect();
        MetricsSnapshot {
            taken_at: Utc::now(),
            slow_threshold_ms: self.slow_threshold.as_millis() as u64,
            operations,
        }
    }

    pub fn operation(&self, name: &str) -> Option<OperationSummary> {
        self.operations.lock().get(name).map(OperationMetrics::summary)
    }

    pub fn reset(&self) {
        self.operations.lock().clear();
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
