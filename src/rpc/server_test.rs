// ABOUTME: Tests for the JSON-RPC server over in-memory streams.
// ABOUTME: Covers the handshake, tool listing, tool calls and protocol errors.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::*;
use crate::config::CoordConfig;
use crate::coordinator::Coordinator;
use crate::store::{MemoryConnector, MemoryStore};

fn server() -> RpcServer {
    let config = CoordConfig {
        store_url: "memory://".into(),
        connect_attempts: 1,
        operation_timeout: Duration::from_millis(200),
        ..CoordConfig::default()
    };
    let connector = Arc::new(MemoryConnector::new(Arc::new(MemoryStore::new())));
    RpcServer::new(Arc::new(Coordinator::with_connector(connector, &config)))
}

async fn request(server: &RpcServer, line: Value) -> RpcResponse {
    match server.handle_line(&line.to_string()).await {
        Some(response) => response,
        None => panic!("Expected a response to {line}"),
    }
}

fn call(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

fn tool_result(response: &RpcResponse) -> ToolCallResult {
    let result = response.result.clone().unwrap_or(Value::Null);
    match serde_json::from_value(result) {
        Ok(result) => result,
        Err(e) => panic!("Expected a tool result, got {:?} ({e})", response),
    }
}

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let server = server();
    let response = request(
        &server,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
    )
    .await;
    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
    assert_eq!(result["serverInfo"]["name"], "agent-coord");
    assert_eq!(response.id, json!(1));
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = server();
    let line = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
    assert!(server.handle_line(&line.to_string()).await.is_none());
}

#[tokio::test]
async fn test_tools_list_includes_every_operation() {
    let server = server();
    let response = request(
        &server,
        json!({ "jsonrpc": "2.0", "id": "list", "method": "tools/list" }),
    )
    .await;
    let tools = response.result.unwrap()["tools"].clone();
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"lock_acquire"));
    assert!(names.contains(&"health_check"));
    assert!(tools[0]["inputSchema"]["properties"].is_object());
}

#[tokio::test]
async fn test_tool_call_success_and_failure() {
    let server = server();
    let acquired = request(
        &server,
        call(1, "lock_acquire", json!({ "file": "a.ts", "agentId": "A" })),
    )
    .await;
    let acquired = tool_result(&acquired);
    assert!(!acquired.is_error);
    assert_eq!(acquired.payload().unwrap()["success"], true);

    let refused = request(
        &server,
        call(2, "lock_acquire", json!({ "file": "a.ts", "agentId": "B" })),
    )
    .await;
    let refused = tool_result(&refused);
    assert!(refused.is_error);
    let payload = refused.payload().unwrap();
    assert_eq!(payload["error"], "LockHeld");
    assert_eq!(payload["currentHolder"], "A");
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = server();

    let unknown = request(&server, json!({ "jsonrpc": "2.0", "id": 1, "method": "resources/list" })).await;
    assert_eq!(unknown.error.unwrap().code, METHOD_NOT_FOUND);

    let bad_params = request(
        &server,
        json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": { "arguments": {} } }),
    )
    .await;
    assert_eq!(bad_params.error.unwrap().code, INVALID_PARAMS);

    let wrong_version = request(&server, json!({ "jsonrpc": "1.0", "id": 3, "method": "ping" })).await;
    assert_eq!(wrong_version.error.unwrap().code, INVALID_REQUEST);

    let garbage = server.handle_line("{not json").await.unwrap();
    assert_eq!(garbage.error.unwrap().code, PARSE_ERROR);
    assert_eq!(garbage.id, Value::Null);
}

#[tokio::test]
async fn test_serve_answers_every_request() {
    let server = server();
    let input = [
        json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        call(2, "agent_register", json!({ "agentId": "A" })),
        json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n")
        + "\n\n";

    let (writer, mut output) = tokio::io::duplex(64 * 1024);
    server.serve(input.as_bytes(), writer).await.unwrap();

    let mut raw = String::new();
    output.read_to_string(&mut raw).await.unwrap();
    let responses: HashMap<u64, RpcResponse> = raw
        .lines()
        .map(|line| serde_json::from_str::<RpcResponse>(line).unwrap())
        .map(|r| (r.id.as_u64().unwrap(), r))
        .collect();

    assert_eq!(responses.len(), 3);
    assert!(responses[&1].result.is_some());
    assert!(!tool_result(&responses[&2]).is_error);
    assert_eq!(responses[&3].result, Some(json!({})));
}

/// Output whose every write fails, like a closed stdout pipe.
struct BrokenPipe;

impl AsyncWrite for BrokenPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_serve_stops_when_output_fails() {
    let server = server();
    let (mut client, input) = tokio::io::duplex(4096);
    client
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
        .await
        .unwrap();

    // Input stays open: serve must return on its own once the writer fails.
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        server.serve(BufReader::new(input), BrokenPipe),
    )
    .await;
    match outcome {
        Ok(Err(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("Expected BrokenPipe error, got {:?}", other),
    }
    drop(client);
}
