// ABOUTME: Per-agent log of refused lock requests.
// ABOUTME: Appends are best effort; a failed append never changes the lock outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::info::LockInfo;
use crate::connection::ConnectionManager;
use crate::error::CoordError;
use crate::store::Keys;

/// One refused acquire: who asked, who held the file, and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub id: Uuid,
    pub file: String,
    pub requested_by: String,
    pub held_by: String,
    #[serde(default)]
    pub reason: String,
    pub held_until: DateTime<Utc>,
    pub at: DateTime<Utc>,
}

impl ConflictRecord {
    pub fn new(requested_by: &str, reason: &str, held: &LockInfo, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file: held.file.clone(),
            requested_by: requested_by.to_string(),
            held_by: held.agent_id.clone(),
            reason: reason.to_string(),
            held_until: held.expires_at,
            at,
        }
    }
}

/// Capped, expiring conflict history per requesting agent.
pub struct ConflictLog {
    conn: Arc<ConnectionManager>,
    keys: Keys,
    max_len: usize,
    ttl: Duration,
}

impl ConflictLog {
    pub fn new(conn: Arc<ConnectionManager>, keys: Keys, max_len: usize, ttl: Duration) -> Self {
        Self {
            conn,
            keys,
            max_len,
            ttl,
        }
    }

    /// Append a record, logging instead of failing.
    pub async fn record(&self, conflict: &ConflictRecord) {
        let key = self.keys.conflicts(&conflict.requested_by);
        let raw = match serde_json::to_string(conflict) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to encode conflict record");
                return;
            }
        };
        let Some(store) = self.conn.current() else {
            tracing::warn!(%key, "no store connection; conflict not logged");
            return;
        };
        if let Err(e) = self
            .conn
            .call(
                "conflict_log",
                &key,
                store.list_push_capped(&key, &raw, self.max_len, self.ttl),
            )
            .await
        {
            tracing::warn!(%key, error = %e, "failed to append conflict record");
        }
    }

    /// Most recent conflicts for `agent_id`, newest first.
    pub async fn recent(&self, agent_id: &str, limit: usize) -> Result<Vec<ConflictRecord>, CoordError> {
        let key = self.keys.conflicts(agent_id);
        let store = self.conn.get_connection().await?;
        let raws = self
            .conn
            .call("lock_conflicts", &key, store.list_range(&key, limit.min(self.max_len)))
            .await?;
        Ok(raws
            .iter()
            .filter_map(|raw| match serde_json::from_str(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(%key, error = %e, "skipping unreadable conflict record");
                    None
                }
            })
            .collect())
    }
}
