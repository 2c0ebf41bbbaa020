// ABOUTME: Typed operations accepted by the coordinator.
// ABOUTME: Raw `{name, arguments}` requests are decoded here, at the boundary.

use serde::Deserialize;
use serde_json::Value;

use crate::agent::AgentState;
use crate::error::CoordError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterArgs {
    pub agent_id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub current_task: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusArgs {
    pub agent_id: String,
    pub status: AgentState,
    pub current_task: Option<String>,
    pub progress: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentArgs {
    pub agent_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAgentsArgs {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Lock a file. `ttl` is in seconds; zero or absent means the default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireArgs {
    pub file: String,
    pub agent_id: String,
    #[serde(default)]
    pub reason: String,
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireManyArgs {
    pub files: Vec<String>,
    pub agent_id: String,
    #[serde(default)]
    pub reason: String,
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewArgs {
    pub file: String,
    pub agent_id: String,
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAgentArgs {
    pub file: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesAgentArgs {
    pub files: Vec<String>,
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileArgs {
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilesArgs {
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLocksArgs {
    pub agent_id: Option<String>,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictsArgs {
    pub agent_id: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetricsArgs {
    pub tool: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NoArgs {}

/// A decoded coordinator request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum Operation {
    AgentRegister(RegisterArgs),
    AgentUpdateStatus(UpdateStatusArgs),
    AgentHeartbeat(AgentArgs),
    AgentList(ListAgentsArgs),
    AgentGetStatus(AgentArgs),
    AgentDetectConflicts(FilesAgentArgs),
    LockAcquire(AcquireArgs),
    LockAcquireMany(AcquireManyArgs),
    LockRenew(RenewArgs),
    LockRelease(FileAgentArgs),
    LockReleaseMany(FilesAgentArgs),
    LockCheck(FileArgs),
    LockBatchCheck(FilesArgs),
    LockList(ListLocksArgs),
    LockConflicts(ConflictsArgs),
    MetricsGet(MetricsArgs),
    HealthCheck(NoArgs),
}

impl Operation {
    /// Every operation name the coordinator accepts.
    pub const NAMES: &'static [&'static str] = &[
        "agent_register",
        "agent_update_status",
        "agent_heartbeat",
        "agent_list",
        "agent_get_status",
        "agent_detect_conflicts",
        "lock_acquire",
        "lock_acquire_many",
        "lock_renew",
        "lock_release",
        "lock_release_many",
        "lock_check",
        "lock_batch_check",
        "lock_list",
        "lock_conflicts",
        "metrics_get",
        "health_check",
    ];

    /// Decode a named request. Missing or null arguments read as `{}`.
    pub fn parse(name: &str, arguments: Value) -> Result<Self, CoordError> {
        if !Self::NAMES.contains(&name) {
            return Err(CoordError::UnknownOperation(name.to_string()));
        }
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let request = serde_json::json!({ "name": name, "arguments": arguments });
        serde_json::from_value(request)
            .map_err(|e| CoordError::InvalidParams(format!("{name}: {e}")))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::AgentRegister(_) => "agent_register",
            Operation::AgentUpdateStatus(_) => "agent_update_status",
            Operation::AgentHeartbeat(_) => "agent_heartbeat",
            Operation::AgentList(_) => "agent_list",
            Operation::AgentGetStatus(_) => "agent_get_status",
            Operation::AgentDetectConflicts(_) => "agent_detect_conflicts",
            Operation::LockAcquire(_) => "lock_acquire",
            Operation::LockAcquireMany(_) => "lock_acquire_many",
            Operation::LockRenew(_) => "lock_renew",
            Operation::LockRelease(_) => "lock_release",
            Operation::LockReleaseMany(_) => "lock_release_many",
            Operation::LockCheck(_) => "lock_check",
            Operation::LockBatchCheck(_) => "lock_batch_check",
            Operation::LockList(_) => "lock_list",
            Operation::LockConflicts(_) => "lock_conflicts",
            Operation::MetricsGet(_) => "metrics_get",
            Operation::HealthCheck(_) => "health_check",
        }
    }
}
