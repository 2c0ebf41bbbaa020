// ABOUTME: Discovery catalog: name, description and JSON input schema per operation.
// ABOUTME: Served by the stdio server's tools/list.

use serde::Serialize;
use serde_json::{Value, json};

/// Describes one operation to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl OperationDef {
    fn new(name: &'static str, description: &'static str, input_schema: Value) -> Self {
        Self {
            name,
            description,
            input_schema,
        }
    }
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn agent_id() -> Value {
    json!({ "type": "string", "description": "Agent identifier" })
}

fn file() -> Value {
    json!({ "type": "string", "description": "File path, relative to the workspace root" })
}

fn files() -> Value {
    json!({ "type": "array", "items": { "type": "string" }, "description": "File paths" })
}

fn ttl() -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "description": "Lock TTL in seconds (defaults to the coordination TTL)"
    })
}

/// Definitions for every operation, in the order of `Operation::NAMES`.
pub fn catalog() -> Vec<OperationDef> {
    vec![
        OperationDef::new(
            "agent_register",
            "Register an agent with the coordination layer",
            object(
                json!({
                    "agentId": { "type": "string", "description": "Unique agent identifier (e.g. \"agent-1\")" },
                    "capabilities": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Agent capabilities (e.g. [\"rust\", \"testing\"])",
                        "default": []
                    },
                    "currentTask": { "type": "string", "description": "Current task id" }
                }),
                &["agentId"],
            ),
        ),
        OperationDef::new(
            "agent_update_status",
            "Update an agent's status, task and progress",
            object(
                json!({
                    "agentId": agent_id(),
                    "status": { "type": "string", "enum": ["idle", "busy", "offline"] },
                    "currentTask": { "type": "string", "description": "Current task id" },
                    "progress": {
                        "type": "number",
                        "minimum": 0,
                        "maximum": 100,
                        "description": "Task progress percentage"
                    }
                }),
                &["agentId", "status"],
            ),
        ),
        OperationDef::new(
            "agent_heartbeat",
            "Mark an agent as alive without changing its status",
            object(json!({ "agentId": agent_id() }), &["agentId"]),
        ),
        OperationDef::new(
            "agent_list",
            "List agents and their status",
            object(
                json!({
                    "includeInactive": {
                        "type": "boolean",
                        "description": "Include agents not seen within the liveness window",
                        "default": false
                    }
                }),
                &[],
            ),
        ),
        OperationDef::new(
            "agent_get_status",
            "Get the status of one agent",
            object(json!({ "agentId": agent_id() }), &["agentId"]),
        ),
        OperationDef::new(
            "agent_detect_conflicts",
            "Find files an agent is about to edit that other agents hold locks on",
            object(
                json!({ "agentId": agent_id(), "files": files() }),
                &["agentId", "files"],
            ),
        ),
        OperationDef::new(
            "lock_acquire",
            "Lock a file for exclusive editing by an agent",
            object(
                json!({
                    "file": file(),
                    "agentId": agent_id(),
                    "reason": { "type": "string", "description": "Why the file is locked" },
                    "ttl": ttl()
                }),
                &["file", "agentId"],
            ),
        ),
        OperationDef::new(
            "lock_acquire_many",
            "Lock several files at once; either all are locked or none",
            object(
                json!({
                    "files": files(),
                    "agentId": agent_id(),
                    "reason": { "type": "string", "description": "Why the files are locked" },
                    "ttl": ttl()
                }),
                &["files", "agentId"],
            ),
        ),
        OperationDef::new(
            "lock_renew",
            "Extend a lock held by the agent",
            object(
                json!({ "file": file(), "agentId": agent_id(), "ttl": ttl() }),
                &["file", "agentId"],
            ),
        ),
        OperationDef::new(
            "lock_release",
            "Release a file lock (releasing an unlocked file succeeds)",
            object(
                json!({ "file": file(), "agentId": agent_id() }),
                &["file", "agentId"],
            ),
        ),
        OperationDef::new(
            "lock_release_many",
            "Release several file locks, reporting each outcome",
            object(
                json!({ "files": files(), "agentId": agent_id() }),
                &["files", "agentId"],
            ),
        ),
        OperationDef::new(
            "lock_check",
            "Check whether a file is locked",
            object(json!({ "file": file() }), &["file"]),
        ),
        OperationDef::new(
            "lock_batch_check",
            "Check the lock state of several files in one call",
            object(json!({ "files": files() }), &["files"]),
        ),
        OperationDef::new(
            "lock_list",
            "List locked files, optionally by holder or glob pattern",
            object(
                json!({
                    "agentId": agent_id(),
                    "pattern": { "type": "string", "description": "Glob over file paths (e.g. \"src/**/*.rs\")" }
                }),
                &[],
            ),
        ),
        OperationDef::new(
            "lock_conflicts",
            "Recent lock requests by an agent that were refused",
            object(
                json!({
                    "agentId": agent_id(),
                    "limit": { "type": "integer", "minimum": 1, "default": 20 }
                }),
                &["agentId"],
            ),
        ),
        OperationDef::new(
            "metrics_get",
            "Per-operation call counts, error counts and latency percentiles",
            object(
                json!({ "tool": { "type": "string", "description": "Restrict to one operation" } }),
                &[],
            ),
        ),
        OperationDef::new(
            "health_check",
            "Report store reachability, latency and cache statistics",
            object(json!({}), &[]),
        ),
    ]
}
