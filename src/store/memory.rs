// ABOUTME: In-process Store backend with lazy TTL expiry.
// ABOUTME: Used for tests and single-process runs; supports fault injection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Connector, Store};
use crate::error::StoreError;

struct Expiring<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, Expiring<String>>,
    indexes: HashMap<String, HashMap<String, f64>>,
    lists: HashMap<String, Expiring<VecDeque<String>>>,
    hashes: HashMap<String, HashMap<String, i64>>,
}

impl Inner {
    /// Live string value, dropping it if expired.
    fn live_string(&mut self, key: &str) -> Option<&String> {
        let now = Instant::now();
        if self.strings.get(key).is_some_and(|e| !e.is_live(now)) {
            self.strings.remove(key);
        }
        self.strings.get(key).map(|e| &e.value)
    }
}

/// A Store kept entirely in process memory.
///
/// Keys expire lazily when touched. Tests can flip availability off to
/// simulate an outage, or add latency to every call.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of live string keys (locks and agent records).
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner.strings.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.is_available() {
            return Err(StoreError::Connection("memory store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.enter().await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.enter().await?;
        Ok(self.inner.lock().live_string(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        Ok(keys
            .iter()
            .map(|k| inner.live_string(k).cloned())
            .collect())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.enter().await?;
        self.inner
            .lock()
            .strings
            .insert(key.to_string(), Expiring::new(value.to_string(), ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        if inner.live_string(key).is_some() {
            return Ok(false);
        }
        inner
            .strings
            .insert(key.to_string(), Expiring::new(value.to_string(), ttl));
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        if inner.live_string(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        inner
            .strings
            .insert(key.to_string(), Expiring::new(value.to_string(), ttl));
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        if inner.live_string(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        inner.strings.remove(key);
        Ok(true)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.enter().await?;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.strings.retain(|_, e| e.is_live(now));
        let mut keys: Vec<String> = inner
            .strings
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn index_upsert_max(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<(), StoreError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        let index = inner.indexes.entry(key.to_string()).or_default();
        let current = index.entry(member.to_string()).or_insert(score);
        if score > *current {
            *current = score;
        }
        Ok(())
    }

    async fn index_range(
        &self,
        key: &str,
        min_score: Option<f64>,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.enter().await?;
        let inner = self.inner.lock();
        let mut members: Vec<(String, f64)> = inner
            .indexes
            .get(key)
            .map(|index| {
                index
                    .iter()
                    .filter(|(_, score)| min_score.is_none_or(|min| **score >= min))
                    .map(|(m, s)| (m.clone(), *s))
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    async fn index_prune(&self, key: &str, max_score: f64) -> Result<u64, StoreError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        let Some(index) = inner.indexes.get_mut(key) else {
            return Ok(0);
        };
        let before = index.len();
        index.retain(|_, score| *score >= max_score);
        Ok((before - index.len()) as u64)
    }

    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.enter().await?;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let entry = inner
            .lists
            .entry(key.to_string())
            .or_insert_with(|| Expiring::new(VecDeque::new(), ttl));
        if !entry.is_live(now) {
            entry.value.clear();
        }
        entry.value.push_front(value.to_string());
        entry.value.truncate(max_len);
        entry.expires_at = Some(now + ttl);
        Ok(())
    }

    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        self.enter().await?;
        let now = Instant::now();
        let inner = self.inner.lock();
        Ok(inner
            .lists
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        let value = inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert(0);
        *value += delta;
        Ok(*value)
    }
}

/// Hands out a shared MemoryStore, optionally failing or stalling connects.
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    fail_next: AtomicU32,
    attempts: AtomicU32,
    delay: Mutex<Option<Duration>>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            fail_next: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            delay: Mutex::new(None),
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Stall every connect attempt by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Total connect attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn Store>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing || !self.store.is_available() {
            return Err(StoreError::Connection("memory store refused connection".into()));
        }
        let store: Arc<dyn Store> = self.store.clone();
        Ok(store)
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
