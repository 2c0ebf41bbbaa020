// ABOUTME: Defines all error types for agent-coord using thiserror.
// ABOUTME: StoreError covers the backend, CoordError the coordination domain.

use chrono::{DateTime, Utc};

/// Errors raised by a store backend.
///
/// Cloneable so a single failed connection attempt can be reported to every
/// caller that was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Store unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

impl StoreError {
    /// Whether this failure means the current handle is unusable.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            StoreError::Connection(_) | StoreError::Exhausted { .. } | StoreError::Timeout(_)
        )
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            StoreError::Connection(err.to_string())
        } else if err.is_timeout() {
            StoreError::Timeout(0)
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Errors from coordination operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoordError {
    #[error("Coordination store unavailable during {operation} ({key}): {reason}")]
    StoreUnavailable {
        operation: String,
        key: String,
        at: DateTime<Utc>,
        reason: String,
    },

    #[error("Store call {operation} ({key}) timed out; outcome unknown")]
    Timeout {
        operation: String,
        key: String,
        at: DateTime<Utc>,
    },

    #[error("Agent '{0}' is not registered")]
    AgentNotRegistered(String),

    #[error("File '{file}' is being edited by agent '{current_holder}'")]
    LockHeld {
        file: String,
        current_holder: String,
        expires_at: DateTime<Utc>,
    },

    #[error("Agent '{agent_id}' does not hold the lock on '{file}'")]
    NotLockHolder {
        file: String,
        agent_id: String,
        current_holder: Option<String>,
    },

    #[error("Lock on '{0}' changed concurrently; retry later")]
    LockContended(String),

    #[error("Record of agent '{0}' changed concurrently; retry later")]
    AgentContended(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Corrupt record at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

impl CoordError {
    /// Stable wire name used in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            CoordError::StoreUnavailable { .. } => "StoreUnavailable",
            CoordError::Timeout { .. } => "Timeout",
            CoordError::AgentNotRegistered(_) => "AgentNotRegistered",
            CoordError::LockHeld { .. } => "LockHeld",
            CoordError::NotLockHolder { .. } => "NotLockHolder",
            CoordError::LockContended(_) => "LockContended",
            CoordError::AgentContended(_) => "AgentContended",
            CoordError::InvalidParams(_) => "InvalidParams",
            CoordError::UnknownOperation(_) => "UnknownOperation",
            CoordError::Corrupt { .. } => "Corrupt",
        }
    }

    /// Whether retrying the same call later can succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordError::StoreUnavailable { .. }
                | CoordError::Timeout { .. }
                | CoordError::LockHeld { .. }
                | CoordError::LockContended(_)
                | CoordError::AgentContended(_)
        )
    }
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
