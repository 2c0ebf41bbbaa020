// ABOUTME: Agent status record as persisted in the coordination store.
// ABOUTME: Serialized as camelCase JSON so any process can read it.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock;

/// What an agent is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    #[default]
    Idle,
    Busy,
    Offline,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentState::Idle => "idle",
            AgentState::Busy => "busy",
            AgentState::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub agent_id: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub status: AgentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    /// Percent complete of the current task, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl AgentStatus {
    pub fn new(
        agent_id: impl Into<String>,
        capabilities: impl IntoIterator<Item = String>,
        current_task: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            capabilities: capabilities.into_iter().collect(),
            status: AgentState::Idle,
            current_task,
            progress: None,
            registered_at: now,
            last_seen: now,
        }
    }

    /// Move `last_seen` forward to `now`; it never goes backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_seen {
            self.last_seen = now;
        }
    }

    /// Whether the agent was seen within `window` of `now`.
    pub fn is_active(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_seen >= clock::before(now, window)
    }
}
