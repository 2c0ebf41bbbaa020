// ABOUTME: Agent registry backed by the coordination store.
// ABOUTME: Records expire after the coordination TTL; an index tracks last-seen times.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::status::{AgentState, AgentStatus};
use crate::cache::ReadThroughCache;
use crate::clock;
use crate::config::CoordConfig;
use crate::connection::ConnectionManager;
use crate::error::CoordError;
use crate::store::{Keys, Store};

const MAX_ROUNDS: usize = 3;

/// Changes applied by `update_status`. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: Option<AgentState>,
    pub current_task: Option<String>,
    pub progress: Option<f64>,
}

/// Shared registry of agents, visible to every process using the same store.
///
/// The store is authoritative. Records are written with the coordination TTL,
/// and each write moves the agent's entry in the active index to its
/// `last_seen` time. Record writes are conditional on the value that was
/// read, so a delayed writer re-reads instead of overwriting newer state,
/// and neither the record nor the index ever moves `last_seen` backwards.
pub struct AgentRegistry {
    conn: Arc<ConnectionManager>,
    keys: Keys,
    cache: ReadThroughCache<AgentStatus>,
    record_ttl: Duration,
    liveness_window: Duration,
}

fn validate_agent_id(agent_id: &str) -> Result<(), CoordError> {
    if agent_id.trim().is_empty() {
        return Err(CoordError::InvalidParams("agentId must not be empty".into()));
    }
    Ok(())
}

fn validate_progress(progress: Option<f64>) -> Result<(), CoordError> {
    match progress {
        Some(p) if !(0.0..=100.0).contains(&p) => Err(CoordError::InvalidParams(format!(
            "progress must be between 0 and 100, got {p}"
        ))),
        _ => Ok(()),
    }
}

fn decode(key: &str, raw: &str) -> Result<AgentStatus, CoordError> {
    serde_json::from_str(raw).map_err(|e| CoordError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn encode(key: &str, status: &AgentStatus) -> Result<String, CoordError> {
    serde_json::to_string(status).map_err(|e| CoordError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl AgentRegistry {
    pub fn new(conn: Arc<ConnectionManager>, config: &CoordConfig) -> Self {
        Self {
            conn,
            keys: Keys::new(config.key_prefix.clone()),
            cache: ReadThroughCache::new(config.cache_capacity, config.cache_ttl),
            record_ttl: config.coordination_ttl,
            liveness_window: config.liveness_window,
        }
    }

    /// Register an agent, or refresh an existing registration.
    ///
    /// A repeat registration replaces capabilities and task, resets the
    /// state to idle, and keeps the original `registered_at`.
    pub async fn register(
        &self,
        agent_id: &str,
        capabilities: Vec<String>,
        current_task: Option<String>,
    ) -> Result<AgentStatus, CoordError> {
        validate_agent_id(agent_id)?;
        let key = self.keys.agent(agent_id);
        let store = self.conn.get_connection().await?;

        for _ in 0..MAX_ROUNDS {
            let raw = self.conn.call("agent_register", &key, store.get(&key)).await?;
            let now = Utc::now();
            let mut status =
                AgentStatus::new(agent_id, capabilities.clone(), current_task.clone(), now);
            if let Some(raw) = raw.as_deref() {
                match decode(&key, raw) {
                    Ok(existing) => {
                        status.registered_at = existing.registered_at;
                        status.last_seen = existing.last_seen;
                        status.touch(now);
                    }
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "overwriting unreadable agent record");
                    }
                }
            }

            if self
                .write(&store, "agent_register", &key, raw.as_deref(), &status)
                .await?
            {
                let capabilities = status.capabilities.len();
                tracing::info!(agent_id, capabilities, "agent registered");
                return Ok(status);
            }
        }

        self.cache.invalidate(agent_id);
        Err(CoordError::AgentContended(agent_id.to_string()))
    }

    /// Merge a status change into a registered agent's record.
    pub async fn update_status(
        &self,
        agent_id: &str,
        update: StatusUpdate,
    ) -> Result<AgentStatus, CoordError> {
        validate_agent_id(agent_id)?;
        validate_progress(update.progress)?;
        self.modify("agent_update_status", agent_id, |status| {
            if let Some(state) = update.status {
                status.status = state;
            }
            if let Some(task) = &update.current_task {
                status.current_task = Some(task.clone());
            }
            if let Some(progress) = update.progress {
                status.progress = Some(progress);
            }
        })
        .await
    }

    /// Refresh `last_seen` without changing anything else.
    pub async fn heartbeat(&self, agent_id: &str) -> Result<AgentStatus, CoordError> {
        validate_agent_id(agent_id)?;
        self.modify("agent_heartbeat", agent_id, |_| {}).await
    }

    /// Agents in the index, most recently seen first.
    ///
    /// Without `include_inactive`, only agents seen within the liveness
    /// window are returned. Index entries older than the record TTL are
    /// pruned along the way.
    pub async fn list_agents(&self, include_inactive: bool) -> Result<Vec<AgentStatus>, CoordError> {
        let store = self.conn.get_connection().await?;
        let index = self.keys.active_agents();
        let now = Utc::now();

        let stale = clock::score(clock::before(now, self.record_ttl));
        match self
            .conn
            .call("agent_list", &index, store.index_prune(&index, stale))
            .await
        {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(pruned, "pruned stale agents from index"),
            Err(e) => tracing::warn!(error = %e, "failed to prune agent index"),
        }

        let min_score =
            (!include_inactive).then(|| clock::score(clock::before(now, self.liveness_window)));
        let members = self
            .conn
            .call("agent_list", &index, store.index_range(&index, min_score))
            .await?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = members.into_iter().rev().map(|(id, _)| id).collect();
        let record_keys: Vec<String> = ids.iter().map(|id| self.keys.agent(id)).collect();
        let raws = self
            .conn
            .call("agent_list", &index, store.get_many(&record_keys))
            .await?;

        let mut agents = Vec::with_capacity(ids.len());
        for ((id, key), raw) in ids.iter().zip(&record_keys).zip(raws) {
            // Index entries can outlive their record.
            let Some(raw) = raw else {
                continue;
            };
            match decode(key, &raw) {
                Ok(status) => {
                    self.cache.set(id, Some(status.clone()));
                    agents.push(status);
                }
                Err(e) => tracing::warn!(%key, error = %e, "skipping unreadable agent record"),
            }
        }
        Ok(agents)
    }

    /// Look up one agent, served from cache when fresh.
    pub async fn get_status(&self, agent_id: &str) -> Result<Option<AgentStatus>, CoordError> {
        validate_agent_id(agent_id)?;
        let key = self.keys.agent(agent_id);
        let key = key.as_str();
        self.cache
            .get_or_fetch(agent_id, move || async move {
                let store = self.conn.get_connection().await?;
                self.load(&store, "agent_get_status", key).await
            })
            .await
    }

    pub fn cache(&self) -> &ReadThroughCache<AgentStatus> {
        &self.cache
    }

    /// Read-modify-write a registered agent's record.
    ///
    /// The write only lands if the record is unchanged since it was read;
    /// otherwise `apply` runs again on the fresh record.
    async fn modify<F>(
        &self,
        operation: &str,
        agent_id: &str,
        apply: F,
    ) -> Result<AgentStatus, CoordError>
    where
        F: Fn(&mut AgentStatus),
    {
        let key = self.keys.agent(agent_id);
        let store = self.conn.get_connection().await?;

        for _ in 0..MAX_ROUNDS {
            let Some(raw) = self.conn.call(operation, &key, store.get(&key)).await? else {
                self.cache.set(agent_id, None);
                return Err(CoordError::AgentNotRegistered(agent_id.to_string()));
            };
            let mut status = decode(&key, &raw)?;
            apply(&mut status);
            status.touch(Utc::now());
            if self.write(&store, operation, &key, Some(&raw), &status).await? {
                tracing::debug!(agent_id, operation, state = %status.status, "agent updated");
                return Ok(status);
            }
            tracing::debug!(agent_id, operation, "agent record changed underneath, retrying");
        }

        self.cache.invalidate(agent_id);
        Err(CoordError::AgentContended(agent_id.to_string()))
    }

    async fn load(
        &self,
        store: &Arc<dyn Store>,
        operation: &str,
        key: &str,
    ) -> Result<Option<AgentStatus>, CoordError> {
        let raw = self.conn.call(operation, key, store.get(key)).await?;
        raw.map(|raw| decode(key, &raw)).transpose()
    }

    /// Write `status` if the stored record still equals `expected`
    /// (`None`: still absent). Returns whether the write landed.
    async fn write(
        &self,
        store: &Arc<dyn Store>,
        operation: &str,
        key: &str,
        expected: Option<&str>,
        status: &AgentStatus,
    ) -> Result<bool, CoordError> {
        let raw = encode(key, status)?;
        let written = match expected {
            Some(previous) => {
                self.conn
                    .call(
                        operation,
                        key,
                        store.compare_and_set(key, previous, &raw, self.record_ttl),
                    )
                    .await?
            }
            None => {
                self.conn
                    .call(operation, key, store.set_if_absent(key, &raw, self.record_ttl))
                    .await?
            }
        };
        if !written {
            return Ok(false);
        }

        let index = self.keys.active_agents();
        self.conn
            .call(
                operation,
                &index,
                store.index_upsert_max(&index, &status.agent_id, clock::score(status.last_seen)),
            )
            .await?;
        self.cache.set(&status.agent_id, Some(status.clone()));
        Ok(true)
    }
}
