// ABOUTME: Tests for the in-memory Store backend.
// ABOUTME: Covers TTL expiry, conditional writes, the sorted index and capped lists.

use std::sync::Arc;
use std::time::Duration;

use super::*;

#[tokio::test]
async fn test_set_and_get_round_trip() {
    let store = MemoryStore::new();
    store.set("k", "v", Duration::from_secs(10)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    assert_eq!(store.get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_values_expire_lazily() {
    let store = MemoryStore::new();
    store.set("k", "v", Duration::from_millis(20)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(store.get("k").await.unwrap(), None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_set_if_absent_only_writes_once() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(10);
    assert!(store.set_if_absent("k", "first", ttl).await.unwrap());
    assert!(!store.set_if_absent("k", "second", ttl).await.unwrap());
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));
}

#[tokio::test]
async fn test_set_if_absent_succeeds_after_expiry() {
    let store = MemoryStore::new();
    assert!(
        store
            .set_if_absent("k", "first", Duration::from_millis(10))
            .await
            .unwrap()
    );
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(
        store
            .set_if_absent("k", "second", Duration::from_secs(10))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_compare_and_set_requires_exact_value() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(10);
    store.set("k", "a", ttl).await.unwrap();
    assert!(!store.compare_and_set("k", "b", "c", ttl).await.unwrap());
    assert!(store.compare_and_set("k", "a", "c", ttl).await.unwrap());
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("c"));
    assert!(!store.compare_and_set("absent", "a", "c", ttl).await.unwrap());
}

#[tokio::test]
async fn test_compare_and_delete_requires_exact_value() {
    let store = MemoryStore::new();
    store.set("k", "a", Duration::from_secs(10)).await.unwrap();
    assert!(!store.compare_and_delete("k", "b").await.unwrap());
    assert!(store.compare_and_delete("k", "a").await.unwrap());
    assert_eq!(store.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_many_preserves_order() {
    let store = MemoryStore::new();
    store.set("a", "1", Duration::from_secs(10)).await.unwrap();
    store.set("c", "3", Duration::from_secs(10)).await.unwrap();
    let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let values = store.get_many(&keys).await.unwrap();
    assert_eq!(values, vec![Some("1".into()), None, Some("3".into())]);
}

#[tokio::test]
async fn test_scan_prefix_filters_and_sorts() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(10);
    store.set("p:lock:b", "x", ttl).await.unwrap();
    store.set("p:lock:a", "x", ttl).await.unwrap();
    store.set("p:agent:a", "x", ttl).await.unwrap();
    let keys = store.scan_prefix("p:lock:").await.unwrap();
    assert_eq!(keys, vec!["p:lock:a".to_string(), "p:lock:b".to_string()]);
}

#[tokio::test]
async fn test_index_never_lowers_score() {
    let store = MemoryStore::new();
    store.index_upsert_max("idx", "a", 200.0).await.unwrap();
    store.index_upsert_max("idx", "a", 100.0).await.unwrap();
    store.index_upsert_max("idx", "b", 50.0).await.unwrap();

    let all = store.index_range("idx", None).await.unwrap();
    assert_eq!(all, vec![("b".to_string(), 50.0), ("a".to_string(), 200.0)]);

    let recent = store.index_range("idx", Some(100.0)).await.unwrap();
    assert_eq!(recent, vec![("a".to_string(), 200.0)]);
}

#[tokio::test]
async fn test_index_prune_removes_old_members() {
    let store = MemoryStore::new();
    store.index_upsert_max("idx", "old", 10.0).await.unwrap();
    store.index_upsert_max("idx", "new", 100.0).await.unwrap();
    assert_eq!(store.index_prune("idx", 50.0).await.unwrap(), 1);
    let all = store.index_range("idx", None).await.unwrap();
    assert_eq!(all, vec![("new".to_string(), 100.0)]);
}

#[tokio::test]
async fn test_capped_list_keeps_newest() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(10);
    for i in 0..5 {
        store
            .list_push_capped("log", &i.to_string(), 3, ttl)
            .await
            .unwrap();
    }
    let entries = store.list_range("log", 10).await.unwrap();
    assert_eq!(entries, vec!["4", "3", "2"]);
    assert_eq!(store.list_range("log", 1).await.unwrap(), vec!["4"]);
}

#[tokio::test]
async fn test_hash_incr_accumulates() {
    let store = MemoryStore::new();
    assert_eq!(store.hash_incr("h", "calls", 1).await.unwrap(), 1);
    assert_eq!(store.hash_incr("h", "calls", 2).await.unwrap(), 3);
}

#[tokio::test]
async fn test_unavailable_store_rejects_calls() {
    let store = MemoryStore::new();
    store.set_available(false);
    let err = store.get("k").await.unwrap_err();
    assert!(err.is_connection());
    store.set_available(true);
    assert!(store.ping().await.is_ok());
}

#[tokio::test]
async fn test_connector_fails_requested_attempts() {
    let connector = MemoryConnector::new(Arc::new(MemoryStore::new()));
    connector.fail_next(2);
    assert!(connector.connect().await.is_err());
    assert!(connector.connect().await.is_err());
    assert!(connector.connect().await.is_ok());
    assert_eq!(connector.attempts(), 3);
}

#[test]
fn test_connector_for_rejects_unknown_scheme() {
    assert!(connector_for("memory://").is_ok());
    assert!(connector_for("redis://localhost:6379").is_ok());
    assert!(connector_for("postgres://localhost").is_err());
}
