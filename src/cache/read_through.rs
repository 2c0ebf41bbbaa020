// ABOUTME: Read-through cache with per-entry TTL and LRU eviction.
// ABOUTME: Caches absence too, and fills misses for a batch in one fetch.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

struct Entry<V> {
    value: Option<V>,
    expires_at: Instant,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// Cached result; `None` means the store said "not found".
    Hit(Option<V>),
    Miss,
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// A bounded cache in front of the coordination store.
///
/// Entries are ordered by last access; inserting past capacity evicts the
/// least recently used. Expired entries are dropped when read. The cache
/// holds no authority: callers write to the store first and only then
/// update or invalidate the cached entry.
pub struct ReadThroughCache<V> {
    entries: Mutex<IndexMap<String, Entry<V>>>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> ReadThroughCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a key, refreshing its recency on a hit.
    pub fn get(&self, key: &str) -> Lookup<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let Some(index) = entries.get_index_of(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Miss;
        };
        if entries[index].expires_at <= now {
            entries.shift_remove_index(index);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Miss;
        }
        let last = entries.len() - 1;
        entries.move_index(index, last);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Lookup::Hit(entries[last].value.clone())
    }

    /// Cache a value, or a known absence with `None`.
    pub fn set(&self, key: &str, value: Option<V>) {
        if self.capacity == 0 {
            return;
        }
        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        let mut entries = self.entries.lock();
        entries.shift_remove(key);
        while entries.len() >= self.capacity {
            entries.shift_remove_index(0);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        entries.insert(key.to_string(), entry);
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().shift_remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Return the cached value or fetch and cache it.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Lookup::Hit(value) = self.get(key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Resolve many keys, fetching only the misses in a single call.
    ///
    /// `fetch` receives the distinct missing keys and must return one result
    /// per key in the same order. Every fetched result, including absence,
    /// is written back. Output follows the order of `keys`.
    pub async fn batch_get<F, Fut, E>(
        &self,
        keys: &[String],
        fetch: F,
    ) -> Result<Vec<(String, Option<V>)>, E>
    where
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Result<Vec<Option<V>>, E>>,
    {
        let mut resolved: IndexMap<String, Option<V>> = IndexMap::new();
        let mut missing: Vec<String> = Vec::new();

        for key in keys {
            if resolved.contains_key(key) || missing.contains(key) {
                continue;
            }
            match self.get(key) {
                Lookup::Hit(value) => {
                    resolved.insert(key.clone(), value);
                }
                Lookup::Miss => missing.push(key.clone()),
            }
        }

        if !missing.is_empty() {
            let mut fetched = fetch(missing.clone()).await?.into_iter();
            for key in missing {
                let value = fetched.next().flatten();
                self.set(&key, value.clone());
                resolved.insert(key, value);
            }
        }

        Ok(keys
            .iter()
            .map(|key| {
                let value = resolved.get(key).cloned().flatten();
                (key.clone(), value)
            })
            .collect())
    }
}
