// ABOUTME: Tests for decoding raw requests into typed operations.
// ABOUTME: Covers defaults, camelCase payloads and rejection of bad input.

use serde_json::json;

use super::*;
use crate::agent::AgentState;
use crate::error::CoordError;

#[test]
fn test_parses_camel_case_payload() {
    let op = Operation::parse(
        "agent_update_status",
        json!({ "agentId": "A", "status": "busy", "currentTask": "t", "progress": 50 }),
    )
    .unwrap();
    assert_eq!(
        op,
        Operation::AgentUpdateStatus(UpdateStatusArgs {
            agent_id: "A".into(),
            status: AgentState::Busy,
            current_task: Some("t".into()),
            progress: Some(50.0),
        })
    );
    assert_eq!(op.name(), "agent_update_status");
}

#[test]
fn test_defaults_fill_optional_fields() {
    let op = Operation::parse("lock_acquire", json!({ "file": "a.ts", "agentId": "A" })).unwrap();
    match op {
        Operation::LockAcquire(args) => {
            assert_eq!(args.reason, "");
            assert_eq!(args.ttl, None);
        }
        other => panic!("Expected LockAcquire, got {:?}", other),
    }
}

#[test]
fn test_null_arguments_read_as_empty() {
    assert_eq!(
        Operation::parse("agent_list", serde_json::Value::Null).unwrap(),
        Operation::AgentList(ListAgentsArgs {
            include_inactive: false
        })
    );
    assert!(matches!(
        Operation::parse("health_check", serde_json::Value::Null),
        Ok(Operation::HealthCheck(_))
    ));
}

#[test]
fn test_unknown_name_is_unknown_operation() {
    match Operation::parse("agent_claim_task", json!({})) {
        Err(CoordError::UnknownOperation(name)) => assert_eq!(name, "agent_claim_task"),
        other => panic!("Expected UnknownOperation, got {:?}", other),
    }
}

#[test]
fn test_bad_payload_is_invalid_params() {
    for (name, args) in [
        ("agent_register", json!({})),
        ("agent_update_status", json!({ "agentId": "A", "status": "working" })),
        ("lock_batch_check", json!({ "files": "a.ts" })),
        ("lock_acquire", json!("a.ts")),
    ] {
        assert!(
            matches!(Operation::parse(name, args), Err(CoordError::InvalidParams(_))),
            "{name} accepted"
        );
    }
}

#[test]
fn test_names_round_trip() {
    for name in Operation::NAMES {
        if let Ok(op) = Operation::parse(name, json!({})) {
            assert_eq!(op.name(), *name);
        }
    }
}
