// ABOUTME: Store module - the key-value backend every coordination record lives in.
// ABOUTME: Defines the Store and Connector traits plus memory and Redis backends.

mod keys;
mod memory;
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use keys::Keys;
pub use memory::{MemoryConnector, MemoryStore};
pub use redis_store::{RedisConnector, RedisStore};

use crate::error::StoreError;

/// Primitive operations the coordination layer needs from its store.
///
/// Every method is a single round trip. String values carry TTLs; the
/// sorted index, capped lists and counter hashes back the active-agent
/// index, conflict logs and persisted metrics.
#[async_trait]
pub trait Store: Send + Sync {
    /// Lightweight liveness check.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Fetch many keys in one pipelined round trip, preserving order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Write only if the key does not exist. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Replace the value only if it currently equals `expected`.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Delete the key only if it currently equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// All live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Set a member's score, never lowering an existing score.
    async fn index_upsert_max(&self, key: &str, member: &str, score: f64)
    -> Result<(), StoreError>;

    /// Members with score >= `min_score` (all if `None`), ascending.
    async fn index_range(
        &self,
        key: &str,
        min_score: Option<f64>,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    /// Remove members with score < `max_score`. Returns how many were removed.
    async fn index_prune(&self, key: &str, max_score: f64) -> Result<u64, StoreError>;

    /// Prepend to a list, keeping at most `max_len` newest entries.
    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Up to `limit` newest list entries.
    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Atomically add `delta` to a hash field.
    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;
}

/// Opens connections to a store.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Store>, StoreError>;

    /// Human-readable target, safe to log.
    fn describe(&self) -> String;
}

/// Pick a connector for a store URL.
pub fn connector_for(url: &str) -> Result<Arc<dyn Connector>, StoreError> {
    if url.starts_with("memory://") {
        Ok(Arc::new(MemoryConnector::new(Arc::new(MemoryStore::new()))))
    } else if url.starts_with("redis://") || url.starts_with("rediss://") {
        Ok(Arc::new(RedisConnector::new(url)?))
    } else {
        Err(StoreError::Connection(format!(
            "unsupported store url scheme: {url}"
        )))
    }
}

#[cfg(test)]
mod memory_test;
