// ABOUTME: Uniform error shape returned by the coordinator.
// ABOUTME: `{error, message, operation, timestamp, retryable}` plus error-specific fields.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::CoordError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Stable error code, e.g. `LockHeld`.
    pub error: String,
    pub message: String,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ErrorEnvelope {
    pub fn new(operation: &str, err: &CoordError) -> Self {
        Self {
            error: err.code().to_string(),
            message: err.to_string(),
            operation: operation.to_string(),
            timestamp: Utc::now(),
            retryable: err.is_retryable(),
            details: details(err),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "error": self.error }))
    }
}

fn details(err: &CoordError) -> Map<String, Value> {
    let value = match err {
        CoordError::StoreUnavailable { key, at, reason, .. } => {
            json!({ "key": key, "at": at, "reason": reason })
        }
        CoordError::Timeout { key, at, .. } => json!({ "key": key, "at": at }),
        CoordError::AgentNotRegistered(agent_id) => json!({ "agentId": agent_id }),
        CoordError::LockHeld {
            file,
            current_holder,
            expires_at,
        } => json!({ "file": file, "currentHolder": current_holder, "expiresAt": expires_at }),
        CoordError::NotLockHolder {
            file,
            agent_id,
            current_holder,
        } => json!({ "file": file, "agentId": agent_id, "currentHolder": current_holder }),
        CoordError::LockContended(file) => json!({ "file": file }),
        CoordError::AgentContended(agent_id) => json!({ "agentId": agent_id }),
        CoordError::Corrupt { key, .. } => json!({ "key": key }),
        CoordError::InvalidParams(_) | CoordError::UnknownOperation(_) => json!({}),
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
