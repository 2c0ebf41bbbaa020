// ABOUTME: Tests for ConnectionManager - shared connects, retry limits,
// ABOUTME: timeouts, invalidation and the health probe.

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::config::CoordConfig;
use crate::error::{CoordError, StoreError};
use crate::store::{MemoryConnector, MemoryStore};

fn test_config() -> CoordConfig {
    CoordConfig {
        connect_timeout: Duration::from_millis(200),
        operation_timeout: Duration::from_millis(100),
        health_interval: Duration::from_millis(20),
        ..CoordConfig::default()
    }
}

fn setup() -> (Arc<MemoryConnector>, Arc<ConnectionManager>) {
    let connector = Arc::new(MemoryConnector::new(Arc::new(MemoryStore::new())));
    let manager = Arc::new(ConnectionManager::new(connector.clone(), &test_config()));
    (connector, manager)
}

#[test]
fn test_backoff_is_linear_then_capped() {
    assert_eq!(backoff_delay(1), Duration::from_millis(100));
    assert_eq!(backoff_delay(3), Duration::from_millis(300));
    assert_eq!(backoff_delay(10), Duration::from_millis(1000));
    assert_eq!(backoff_delay(50), Duration::from_millis(1000));
}

#[tokio::test]
async fn test_connection_is_reused() {
    let (connector, manager) = setup();
    manager.get_connection().await.unwrap();
    manager.get_connection().await.unwrap();
    assert_eq!(connector.attempts(), 1);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_attempt() {
    let (connector, manager) = setup();
    connector.set_delay(Some(Duration::from_millis(50)));

    let calls = (0..8).map(|_| {
        let manager = manager.clone();
        async move { manager.get_connection().await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_retries_then_succeeds() {
    let (connector, manager) = setup();
    connector.fail_next(2);
    assert!(manager.get_connection().await.is_ok());
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn test_gives_up_after_three_failures() {
    let (connector, manager) = setup();
    connector.fail_next(10);

    let err = manager.get_connection().await.err().unwrap();
    assert!(matches!(err, CoordError::StoreUnavailable { .. }));
    assert_eq!(connector.attempts(), 3);
    assert!(!manager.is_connected());

    // A later call starts a fresh attempt rather than replaying the failure.
    connector.fail_next(0);
    assert!(manager.get_connection().await.is_ok());
    assert_eq!(connector.attempts(), 4);
}

#[tokio::test]
async fn test_connect_timeout_counts_as_failed_attempt() {
    let connector = Arc::new(MemoryConnector::new(Arc::new(MemoryStore::new())));
    connector.set_delay(Some(Duration::from_millis(200)));
    let config = CoordConfig {
        connect_timeout: Duration::from_millis(20),
        connect_attempts: 2,
        ..test_config()
    };
    let manager = ConnectionManager::new(connector.clone(), &config);

    let started = std::time::Instant::now();
    let err = manager.get_connection().await.err().unwrap();
    assert!(matches!(err, CoordError::StoreUnavailable { .. }));
    assert_eq!(connector.attempts(), 2);
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn test_call_maps_connection_failure_and_invalidates() {
    let (connector, manager) = setup();
    let store = manager.get_connection().await.unwrap();
    connector.store().set_available(false);

    let err = manager
        .call("lock_acquire", "coord:lock:a", store.get("coord:lock:a"))
        .await
        .unwrap_err();
    match err {
        CoordError::StoreUnavailable { operation, key, .. } => {
            assert_eq!(operation, "lock_acquire");
            assert_eq!(key, "coord:lock:a");
        }
        other => panic!("Expected StoreUnavailable, got {:?}", other),
    }
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_call_reports_timeout_as_unknown_outcome() {
    let (connector, manager) = setup();
    let store = manager.get_connection().await.unwrap();
    connector.store().set_latency(Some(Duration::from_millis(300)));

    let err = manager
        .call("lock_acquire", "k", store.set("k", "v", Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::Timeout { .. }));
}

#[tokio::test]
async fn test_call_keeps_connection_on_command_error() {
    let (_connector, manager) = setup();
    manager.get_connection().await.unwrap();
    let result: Result<(), CoordError> = manager
        .call("op", "k", async { Err(StoreError::Command("WRONGTYPE".into())) })
        .await;
    assert!(result.is_err());
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_probe_invalidates_on_failure() {
    let (connector, manager) = setup();
    manager.get_connection().await.unwrap();
    assert!(manager.probe_once().await);

    connector.store().set_available(false);
    assert!(!manager.probe_once().await);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_background_probe_drops_dead_connection() {
    let (connector, manager) = setup();
    manager.open().await.unwrap();
    connector.store().set_available(false);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!manager.is_connected());

    connector.store().set_available(true);
    assert!(manager.get_connection().await.is_ok());
    manager.close();
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_health_reports_state() {
    let (connector, manager) = setup();
    assert!(manager.health().await.healthy);

    connector.store().set_available(false);
    let health = manager.health().await;
    assert!(!health.healthy);
    assert!(health.error.is_some());
}

#[tokio::test]
async fn test_current_never_connects() {
    let (connector, manager) = setup();
    assert!(manager.current().is_none());
    assert_eq!(connector.attempts(), 0);

    manager.get_connection().await.unwrap();
    assert!(manager.current().is_some());
    manager.invalidate();
    assert!(manager.current().is_none());
}
