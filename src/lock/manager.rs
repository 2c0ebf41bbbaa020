// ABOUTME: Advisory file locks shared through the coordination store.
// ABOUTME: Acquire, renew and release are conditional writes on the exact stored record.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;

use super::conflicts::{ConflictLog, ConflictRecord};
use super::info::{LockInfo, normalize_path};
use crate::cache::ReadThroughCache;
use crate::clock;
use crate::config::CoordConfig;
use crate::connection::ConnectionManager;
use crate::error::CoordError;
use crate::store::Keys;

/// Rounds of read-then-conditional-write before reporting contention.
const MAX_ROUNDS: usize = 3;

fn validate_agent_id(agent_id: &str) -> Result<(), CoordError> {
    if agent_id.trim().is_empty() {
        return Err(CoordError::InvalidParams("agentId must not be empty".into()));
    }
    Ok(())
}

fn decode(key: &str, raw: &str) -> Result<LockInfo, CoordError> {
    serde_json::from_str(raw).map_err(|e| CoordError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn encode(key: &str, info: &LockInfo) -> Result<String, CoordError> {
    serde_json::to_string(info).map_err(|e| CoordError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// File lock manager.
///
/// # Lock semantics
///
/// - **Exclusive:** at most one unexpired lock per normalized path. Acquire
///   writes only if the key is absent, and replaces an existing record only
///   if it still holds the exact bytes that were read.
/// - **Re-entrant:** the holder may acquire again; this refreshes the lock.
/// - **Expiry:** a lock past `expires_at` is treated as absent even if the
///   store has not evicted it yet.
/// - **Release:** releasing a file nobody holds succeeds; releasing a file
///   held by someone else fails with `NotLockHolder`.
pub struct LockManager {
    conn: Arc<ConnectionManager>,
    keys: Keys,
    cache: ReadThroughCache<LockInfo>,
    conflicts: ConflictLog,
    default_ttl: Duration,
}

impl LockManager {
    pub fn new(conn: Arc<ConnectionManager>, config: &CoordConfig) -> Self {
        let keys = Keys::new(config.key_prefix.clone());
        let conflicts = ConflictLog::new(
            Arc::clone(&conn),
            keys.clone(),
            config.conflict_log_len,
            config.coordination_ttl,
        );
        Self {
            conn,
            keys,
            cache: ReadThroughCache::new(config.cache_capacity, config.cache_ttl),
            conflicts,
            default_ttl: config.coordination_ttl,
        }
    }

    /// Acquire (or refresh) the lock on `file` for `agent_id`.
    ///
    /// Fails with `LockHeld` when another agent holds an unexpired lock, and
    /// with `LockContended` when the record keeps changing under us.
    pub async fn acquire(
        &self,
        file: &str,
        agent_id: &str,
        reason: &str,
        ttl: Option<Duration>,
    ) -> Result<LockInfo, CoordError> {
        let path = normalize_path(file)?;
        validate_agent_id(agent_id)?;
        let key = self.keys.lock(&path);
        let ttl = ttl.unwrap_or(self.default_ttl);
        let store = self.conn.get_connection().await?;

        for _ in 0..MAX_ROUNDS {
            let now = Utc::now();
            let info = LockInfo::new(path.clone(), agent_id, reason, now, ttl);
            let raw = encode(&key, &info)?;

            if self
                .conn
                .call("lock_acquire", &key, store.set_if_absent(&key, &raw, ttl))
                .await?
            {
                self.cache.set(&path, Some(info.clone()));
                tracing::debug!(file = %path, agent_id, "lock acquired");
                return Ok(info);
            }

            let Some(current_raw) = self.conn.call("lock_acquire", &key, store.get(&key)).await?
            else {
                // Released or evicted between the two calls.
                continue;
            };
            match decode(&key, &current_raw) {
                Ok(current) if !current.is_expired(now) && !current.is_held_by(agent_id) => {
                    self.cache.set(&path, Some(current.clone()));
                    self.conflicts
                        .record(&ConflictRecord::new(agent_id, reason, &current, now))
                        .await;
                    tracing::info!(file = %path, agent_id, holder = %current.agent_id, "lock conflict");
                    return Err(CoordError::LockHeld {
                        file: path,
                        current_holder: current.agent_id,
                        expires_at: current.expires_at,
                    });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(%key, error = %e, "replacing unreadable lock record"),
            }

            // Ours, expired, or unreadable: replace it if nobody else has.
            if self
                .conn
                .call(
                    "lock_acquire",
                    &key,
                    store.compare_and_set(&key, &current_raw, &raw, ttl),
                )
                .await?
            {
                self.cache.set(&path, Some(info.clone()));
                tracing::debug!(file = %path, agent_id, "lock acquired over stale record");
                return Ok(info);
            }
        }

        self.cache.invalidate(&path);
        Err(CoordError::LockContended(path))
    }

    /// Extend a held lock by `ttl` (or the default) from now.
    pub async fn renew(
        &self,
        file: &str,
        agent_id: &str,
        ttl: Option<Duration>,
    ) -> Result<LockInfo, CoordError> {
        let path = normalize_path(file)?;
        validate_agent_id(agent_id)?;
        let key = self.keys.lock(&path);
        let ttl = ttl.unwrap_or(self.default_ttl);
        let store = self.conn.get_connection().await?;

        for _ in 0..MAX_ROUNDS {
            let now = Utc::now();
            let raw = self.conn.call("lock_renew", &key, store.get(&key)).await?;
            let current = raw.as_deref().map(|r| decode(&key, r)).transpose()?;

            let (raw, current) = match (raw, current) {
                (Some(raw), Some(current))
                    if current.is_held_by(agent_id) && !current.is_expired(now) =>
                {
                    (raw, current)
                }
                (_, current) => {
                    let current_holder = current
                        .filter(|c| !c.is_expired(now))
                        .map(|c| c.agent_id);
                    self.cache.invalidate(&path);
                    return Err(CoordError::NotLockHolder {
                        file: path,
                        agent_id: agent_id.to_string(),
                        current_holder,
                    });
                }
            };

            let renewed = LockInfo {
                expires_at: clock::after(now, ttl),
                ..current
            };
            let renewed_raw = encode(&key, &renewed)?;
            if self
                .conn
                .call(
                    "lock_renew",
                    &key,
                    store.compare_and_set(&key, &raw, &renewed_raw, ttl),
                )
                .await?
            {
                self.cache.set(&path, Some(renewed.clone()));
                tracing::debug!(file = %path, agent_id, "lock renewed");
                return Ok(renewed);
            }
        }

        self.cache.invalidate(&path);
        Err(CoordError::LockContended(path))
    }

    /// Release a lock held by `agent_id`. Releasing an unheld file succeeds.
    pub async fn release(&self, file: &str, agent_id: &str) -> Result<(), CoordError> {
        let path = normalize_path(file)?;
        validate_agent_id(agent_id)?;
        let key = self.keys.lock(&path);
        let store = self.conn.get_connection().await?;

        for _ in 0..MAX_ROUNDS {
            let now = Utc::now();
            let Some(raw) = self.conn.call("lock_release", &key, store.get(&key)).await? else {
                self.cache.invalidate(&path);
                return Ok(());
            };
            let current = decode(&key, &raw)?;

            if current.is_expired(now) {
                // Logically gone already; clear the leftover if it is unchanged.
                self.conn
                    .call("lock_release", &key, store.compare_and_delete(&key, &raw))
                    .await?;
                self.cache.invalidate(&path);
                return Ok(());
            }
            if !current.is_held_by(agent_id) {
                self.cache.set(&path, Some(current.clone()));
                return Err(CoordError::NotLockHolder {
                    file: path,
                    agent_id: agent_id.to_string(),
                    current_holder: Some(current.agent_id),
                });
            }
            if self
                .conn
                .call("lock_release", &key, store.compare_and_delete(&key, &raw))
                .await?
            {
                self.cache.invalidate(&path);
                tracing::debug!(file = %path, agent_id, "lock released");
                return Ok(());
            }
        }

        self.cache.invalidate(&path);
        Err(CoordError::LockContended(path))
    }

    /// Current unexpired lock on `file`, if any.
    pub async fn check(&self, file: &str) -> Result<Option<LockInfo>, CoordError> {
        let path = normalize_path(file)?;
        let paths = [path.clone()];
        let lock = self
            .cache
            .get_or_fetch(&path, move || async move {
                Ok::<_, CoordError>(self.fetch(paths.to_vec()).await?.pop().flatten())
            })
            .await?;
        Ok(self.unexpired(&path, lock))
    }

    /// Check many files at once; only cache misses reach the store, in one round trip.
    ///
    /// Keys in the result are the paths as given, in input order.
    pub async fn batch_check(
        &self,
        files: &[String],
    ) -> Result<IndexMap<String, Option<LockInfo>>, CoordError> {
        let paths = files
            .iter()
            .map(|f| normalize_path(f))
            .collect::<Result<Vec<_>, _>>()?;
        let resolved = self
            .cache
            .batch_get(&paths, move |missing| self.fetch(missing))
            .await?;

        Ok(files
            .iter()
            .zip(resolved)
            .map(|(file, (path, lock))| (file.clone(), self.unexpired(&path, lock)))
            .collect())
    }

    /// Unexpired locks on `files` held by agents other than `agent_id`.
    ///
    /// A pre-flight before editing; served through the cache like
    /// `batch_check`, so it never decides ownership on its own.
    pub async fn detect_conflicts(
        &self,
        agent_id: &str,
        files: &[String],
    ) -> Result<Vec<LockInfo>, CoordError> {
        validate_agent_id(agent_id)?;
        let mut seen = HashSet::new();
        Ok(self
            .batch_check(files)
            .await?
            .into_values()
            .flatten()
            .filter(|lock| !lock.is_held_by(agent_id))
            .filter(|lock| seen.insert(lock.file.clone()))
            .collect())
    }

    /// Acquire every file or none.
    ///
    /// On the first failure, locks taken by this call are released again.
    /// Files the agent already held before the call are left held.
    pub async fn acquire_many(
        &self,
        files: &[String],
        agent_id: &str,
        reason: &str,
        ttl: Option<Duration>,
    ) -> Result<Vec<LockInfo>, CoordError> {
        validate_agent_id(agent_id)?;
        let mut paths = Vec::with_capacity(files.len());
        let mut seen = HashSet::new();
        for file in files {
            let path = normalize_path(file)?;
            if seen.insert(path.clone()) {
                paths.push(path);
            }
        }

        let mut acquired: Vec<LockInfo> = Vec::with_capacity(paths.len());
        let mut taken_here: Vec<String> = Vec::new();
        for path in &paths {
            let held_before = self
                .read_fresh(path)
                .await?
                .is_some_and(|l| l.is_held_by(agent_id));
            match self.acquire(path, agent_id, reason, ttl).await {
                Ok(info) => {
                    if !held_before {
                        taken_here.push(path.clone());
                    }
                    acquired.push(info);
                }
                Err(e) => {
                    self.roll_back(&taken_here, agent_id).await;
                    return Err(e);
                }
            }
        }
        Ok(acquired)
    }

    /// Release each file independently, reporting per-file outcomes.
    pub async fn release_many(
        &self,
        files: &[String],
        agent_id: &str,
    ) -> Vec<(String, Result<(), CoordError>)> {
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let outcome = self.release(file, agent_id).await;
            outcomes.push((file.clone(), outcome));
        }
        outcomes
    }

    /// Unexpired locks, optionally filtered by holder and a glob over the path.
    pub async fn list(
        &self,
        agent_id: Option<&str>,
        pattern: Option<&str>,
    ) -> Result<Vec<LockInfo>, CoordError> {
        let pattern = pattern
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| CoordError::InvalidParams(format!("invalid pattern: {e}")))?;

        let prefix = self.keys.lock_prefix();
        let store = self.conn.get_connection().await?;
        let lock_keys = self
            .conn
            .call("lock_list", &prefix, store.scan_prefix(&prefix))
            .await?;
        if lock_keys.is_empty() {
            return Ok(Vec::new());
        }
        let raws = self
            .conn
            .call("lock_list", &prefix, store.get_many(&lock_keys))
            .await?;

        let now = Utc::now();
        let mut locks: Vec<LockInfo> = lock_keys
            .iter()
            .zip(raws)
            .filter_map(|(key, raw)| {
                let raw = raw?;
                match decode(key, &raw) {
                    Ok(lock) => Some(lock),
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "skipping unreadable lock record");
                        None
                    }
                }
            })
            .filter(|lock| !lock.is_expired(now))
            .filter(|lock| agent_id.is_none_or(|a| lock.is_held_by(a)))
            .filter(|lock| pattern.as_ref().is_none_or(|p| p.matches(&lock.file)))
            .collect();
        locks.sort_by(|a, b| a.file.cmp(&b.file));
        Ok(locks)
    }

    /// Recent refused acquires made by `agent_id`, newest first.
    pub async fn conflicts(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<ConflictRecord>, CoordError> {
        validate_agent_id(agent_id)?;
        self.conflicts.recent(agent_id, limit).await
    }

    pub fn cache(&self) -> &ReadThroughCache<LockInfo> {
        &self.cache
    }

    async fn roll_back(&self, paths: &[String], agent_id: &str) {
        for path in paths.iter().rev() {
            if let Err(e) = self.release(path, agent_id).await {
                tracing::warn!(file = %path, agent_id, error = %e, "rollback release failed");
            }
        }
    }

    /// Store read that bypasses the cache.
    async fn read_fresh(&self, path: &str) -> Result<Option<LockInfo>, CoordError> {
        let lock = self.fetch(vec![path.to_string()]).await?.pop().flatten();
        Ok(lock.filter(|l| !l.is_expired(Utc::now())))
    }

    /// One pipelined read for many normalized paths. Unreadable records read as absent.
    async fn fetch(&self, paths: Vec<String>) -> Result<Vec<Option<LockInfo>>, CoordError> {
        let lock_keys: Vec<String> = paths.iter().map(|p| self.keys.lock(p)).collect();
        let store = self.conn.get_connection().await?;
        let label = lock_keys.first().cloned().unwrap_or_default();
        let raws = self
            .conn
            .call("lock_check", &label, store.get_many(&lock_keys))
            .await?;
        Ok(lock_keys
            .iter()
            .zip(raws)
            .map(|(key, raw)| {
                let raw = raw?;
                decode(key, &raw)
                    .map_err(|e| tracing::warn!(%key, error = %e, "ignoring unreadable lock record"))
                    .ok()
            })
            .collect())
    }

    /// Drop an expired lock from a lookup result and from the cache.
    fn unexpired(&self, path: &str, lock: Option<LockInfo>) -> Option<LockInfo> {
        match lock {
            Some(lock) if lock.is_expired(Utc::now()) => {
                self.cache.invalidate(path);
                None
            }
            other => other,
        }
    }
}
