// ABOUTME: Tests for the per-operation Metrics recorder.
// ABOUTME: Covers counting, filtering and percentile calculation.

use std::time::Duration;

use super::metrics::{Metrics, SAMPLE_WINDOW};

#[test]
fn test_counts_calls_and_errors() {
    let metrics = Metrics::new();
    metrics.record("lock_acquire", Duration::from_millis(2), true);
    metrics.record("lock_acquire", Duration::from_millis(4), false);
    metrics.record("agent_list", Duration::from_millis(1), true);

    let all = metrics.snapshot(None);
    assert_eq!(all.len(), 2);
    let acquire = &all["lock_acquire"];
    assert_eq!(acquire.calls, 2);
    assert_eq!(acquire.errors, 1);
    assert!((acquire.avg_ms - 3.0).abs() < 1e-9);
    assert!((acquire.max_ms - 4.0).abs() < 1e-9);
}

#[test]
fn test_snapshot_filters_by_operation() {
    let metrics = Metrics::new();
    metrics.record("lock_acquire", Duration::from_millis(1), true);
    metrics.record("agent_list", Duration::from_millis(1), true);

    let only = metrics.snapshot(Some("agent_list"));
    assert_eq!(only.keys().collect::<Vec<_>>(), vec!["agent_list"]);
    assert!(metrics.snapshot(Some("missing")).is_empty());
}

#[test]
fn test_percentiles_use_nearest_rank() {
    let metrics = Metrics::new();
    for ms in 1..=100 {
        metrics.record("op", Duration::from_millis(ms), true);
    }
    let op = &metrics.snapshot(Some("op"))["op"];
    assert!((op.p50_ms - 50.0).abs() < 1e-9);
    assert!((op.p95_ms - 95.0).abs() < 1e-9);
    assert!((op.p99_ms - 99.0).abs() < 1e-9);
}

#[test]
fn test_sample_window_is_bounded() {
    let metrics = Metrics::new();
    for _ in 0..SAMPLE_WINDOW {
        metrics.record("op", Duration::from_millis(100), true);
    }
    // A full window of fast calls pushes every slow sample out.
    for _ in 0..SAMPLE_WINDOW {
        metrics.record("op", Duration::from_millis(1), true);
    }
    let op = &metrics.snapshot(Some("op"))["op"];
    assert_eq!(op.calls, 2 * SAMPLE_WINDOW as u64);
    assert!((op.p99_ms - 1.0).abs() < 1e-9);
    assert!((op.max_ms - 100.0).abs() < 1e-9);
}
