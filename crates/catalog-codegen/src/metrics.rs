//! Generator metrics.
//!
//! A fixed registry over [`Operation`]. Every observation is emitted through
//! the `metrics` facade and also kept in atomic totals, so reports and the
//! health check can include a [`MetricsSnapshot`] without a recorder.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use serde::Serialize;
use tracing::{error, info};

use crate::error::Result;
use crate::template::CacheStats;

/// Successful operations counter.
pub const OPERATION_SUCCESS: &str = "catalog_codegen_operation_success_total";

/// Failed operations counter.
pub const OPERATION_FAILURE: &str = "catalog_codegen_operation_failure_total";

/// Operation duration histogram.
pub const OPERATION_DURATION: &str = "catalog_codegen_operation_duration_seconds";

/// Template cache hit gauge.
pub const TEMPLATE_CACHE_HITS: &str = "catalog_codegen_template_cache_hits";

/// Template cache miss gauge.
pub const TEMPLATE_CACHE_MISSES: &str = "catalog_codegen_template_cache_misses";

/// Template cache size gauge.
pub const TEMPLATE_CACHE_SIZE: &str = "catalog_codegen_template_cache_size";

/// Observed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Connect,
    Introspect,
    Precompile,
    Render,
    Write,
    Generate,
    HealthCheck,
    Close,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::Connect,
        Operation::Introspect,
        Operation::Precompile,
        Operation::Render,
        Operation::Write,
        Operation::Generate,
        Operation::HealthCheck,
        Operation::Close,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Introspect => "introspect",
            Operation::Precompile => "precompile",
            Operation::Render => "render",
            Operation::Write => "write",
            Operation::Generate => "generate",
            Operation::HealthCheck => "health_check",
            Operation::Close => "close",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Registers metric descriptions with the installed recorder.
pub fn register_metrics() {
    describe_counter!(OPERATION_SUCCESS, "Operations that completed successfully");
    describe_counter!(OPERATION_FAILURE, "Operations that failed");
    describe_histogram!(OPERATION_DURATION, "Operation duration in seconds");
    describe_gauge!(TEMPLATE_CACHE_HITS, "Template cache hits");
    describe_gauge!(TEMPLATE_CACHE_MISSES, "Template cache misses");
    describe_gauge!(TEMPLATE_CACHE_SIZE, "Compiled templates held by the cache");
}

#[derive(Default)]
struct OperationTotals {
    success: AtomicU64,
    failure: AtomicU64,
    duration_micros: AtomicU64,
}

/// Typed metric registry.
pub struct Metrics {
    totals: [OperationTotals; 8],
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        register_metrics();
        Self {
            totals: Default::default(),
        }
    }

    pub fn record_success(&self, op: Operation, elapsed: Duration) {
        let t = &self.totals[op.index()];
        t.success.fetch_add(1, Ordering::Relaxed);
        t.duration_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        counter!(OPERATION_SUCCESS, "operation" => op.as_str()).increment(1);
        histogram!(OPERATION_DURATION, "operation" => op.as_str()).record(elapsed.as_secs_f64());
    }

    pub fn record_failure(&self, op: Operation, elapsed: Duration) {
        let t = &self.totals[op.index()];
        t.failure.fetch_add(1, Ordering::Relaxed);
        t.duration_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        counter!(OPERATION_FAILURE, "operation" => op.as_str()).increment(1);
        histogram!(OPERATION_DURATION, "operation" => op.as_str()).record(elapsed.as_secs_f64());
    }

    pub fn record_cache(&self, stats: &CacheStats) {
        gauge!(TEMPLATE_CACHE_HITS).set(stats.hits as f64);
        gauge!(TEMPLATE_CACHE_MISSES).set(stats.misses as f64);
        gauge!(TEMPLATE_CACHE_SIZE).set(stats.size as f64);
    }

    /// Run `fut`, logging start, success and failure and recording the outcome.
    pub async fn observe<T, F>(&self, op: Operation, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        info!(operation = op.as_str(), "Operation started");
        let started = Instant::now();
        let result = fut.await;
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => {
                self.record_success(op, elapsed);
                info!(
                    operation = op.as_str(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Operation succeeded"
                );
            }
            Err(e) => {
                self.record_failure(op, elapsed);
                error!(
                    operation = op.as_str(),
                    duration_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Operation failed"
                );
            }
        }
        result
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations: Operation::ALL
                .iter()
                .map(|op| {
                    let t = &self.totals[op.index()];
                    OperationSnapshot {
                        operation: *op,
                        success: t.success.load(Ordering::Relaxed),
                        failure: t.failure.load(Ordering::Relaxed),
                        total_duration_ms: t.duration_micros.load(Ordering::Relaxed) / 1000,
                    }
                })
                .filter(|s| s.success + s.failure > 0)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSnapshot {
    pub operation: Operation,
    pub success: u64,
    pub failure: u64,
    pub total_duration_ms: u64,
}

/// Point-in-time totals for operations that ran at least once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub operations: Vec<OperationSnapshot>,
}

impl MetricsSnapshot {
    pub fn get(&self, op: Operation) -> Option<&OperationSnapshot> {
        self.operations.iter().find(|s| s.operation == op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodegenError;

    #[tokio::test]
    async fn test_observe_records_success_and_failure() {
        let metrics = Metrics::new();

        let ok: Result<u32> = metrics.observe(Operation::Introspect, async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<()> = metrics
            .observe(Operation::Connect, async {
                Err(CodegenError::pool("refused", "connect"))
            })
            .await;
        assert!(err.is_err());

        let snap = metrics.snapshot();
        assert_eq!(snap.get(Operation::Introspect).unwrap().success, 1);
        assert_eq!(snap.get(Operation::Connect).unwrap().failure, 1);
        assert!(snap.get(Operation::Render).is_none());
    }

    #[test]
    fn test_operation_indices_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for op in Operation::ALL {
            assert!(seen.insert(op.index()));
            assert!(op.index() < 8);
        }
    }
}
