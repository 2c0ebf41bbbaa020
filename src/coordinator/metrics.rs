// ABOUTME: In-process per-operation metrics: counts, errors and latency percentiles.
// ABOUTME: Keeps a bounded window of recent durations per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Recent durations kept per operation for percentiles.
pub const SAMPLE_WINDOW: usize = 1024;

#[derive(Default)]
struct OperationStats {
    calls: u64,
    errors: u64,
    total: Duration,
    max: Duration,
    samples: VecDeque<Duration>,
}

/// Snapshot of one operation's metrics. Latencies are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetrics {
    pub calls: u64,
    pub errors: u64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Authoritative metrics for this process's lifetime.
#[derive(Default)]
pub struct Metrics {
    operations: Mutex<HashMap<String, OperationStats>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: &str, elapsed: Duration, success: bool) {
        let mut operations = self.operations.lock();
        let stats = operations.entry(operation.to_string()).or_default();
        stats.calls += 1;
        if !success {
            stats.errors += 1;
        }
        stats.total += elapsed;
        stats.max = stats.max.max(elapsed);
        if stats.samples.len() == SAMPLE_WINDOW {
            stats.samples.pop_front();
        }
        stats.samples.push_back(elapsed);
    }

    /// Metrics for one operation, or all when `operation` is `None`.
    pub fn snapshot(&self, operation: Option<&str>) -> BTreeMap<String, OperationMetrics> {
        let operations = self.operations.lock();
        operations
            .iter()
            .filter(|(name, _)| operation.is_none_or(|op| op == name.as_str()))
            .map(|(name, stats)| {
                let mut sorted: Vec<Duration> = stats.samples.iter().copied().collect();
                sorted.sort();
                let avg = if stats.calls == 0 {
                    0.0
                } else {
                    millis(stats.total) / stats.calls as f64
                };
                let metrics = OperationMetrics {
                    calls: stats.calls,
                    errors: stats.errors,
                    avg_ms: avg,
                    p50_ms: millis(percentile(&sorted, 50.0)),
                    p95_ms: millis(percentile(&sorted, 95.0)),
                    p99_ms: millis(percentile(&sorted, 99.0)),
                    max_ms: millis(stats.max),
                };
                (name.clone(), metrics)
            })
            .collect()
    }
}
