// ABOUTME: Line-delimited JSON-RPC server exposing the coordinator as tools.
// ABOUTME: Each request runs as its own task; responses share one writer.

use std::io;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::types::{
    INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, PARSE_ERROR, PROTOCOL_VERSION, RpcError,
    RpcRequest, RpcResponse, ToolCallParams, ToolCallResult,
};
use crate::coordinator::Coordinator;

/// Serves `initialize`, `ping`, `tools/list` and `tools/call`.
#[derive(Clone)]
pub struct RpcServer {
    coordinator: Arc<Coordinator>,
}

impl RpcServer {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Read requests line by line until EOF, writing one response line per request.
    ///
    /// Requests are handled concurrently, so responses may come back out of
    /// order; callers match them by `id`. Returns once input is exhausted and
    /// every in-flight request has been answered, or with the writer's error
    /// as soon as the output side fails.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<RpcResponse>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                let json = serde_json::to_string(&response)?;
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<_, io::Error>(())
        });

        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tx.closed() => {
                    tracing::warn!("response writer stopped; no longer reading requests");
                    break;
                }
            };
            let Some(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            let server = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.handle_line(&line).await {
                    if let Err(lost) = tx.send(response) {
                        tracing::warn!(id = %lost.0.id, "response dropped; writer has stopped");
                    }
                }
            });
        }
        drop(tx);

        tracing::info!("input closed; draining in-flight requests");
        writer_task.await.map_err(io::Error::other)?
    }

    /// Handle one raw line. Notifications produce no response.
    pub async fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        match serde_json::from_str::<RpcRequest>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                Some(RpcResponse::failure(
                    Value::Null,
                    RpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
                ))
            }
        }
    }

    pub async fn handle(&self, request: RpcRequest) -> Option<RpcResponse> {
        tracing::debug!(method = %request.method, "rpc request");
        let outcome = if request.jsonrpc != JSONRPC_VERSION {
            Err(RpcError::new(
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version {:?}", request.jsonrpc),
            ))
        } else {
            self.route(&request.method, request.params).await
        };

        let id = request.id?;
        Some(match outcome {
            Ok(result) => RpcResponse::success(id, result),
            Err(error) => RpcResponse::failure(id, error),
        })
    }

    async fn route(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "ping" => Ok(json!({})),
            "notifications/initialized" | "notifications/cancelled" => Ok(Value::Null),
            "tools/list" => Ok(json!({ "tools": self.coordinator.operations() })),
            "tools/call" => {
                let params: ToolCallParams =
                    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(|e| {
                        RpcError::new(INVALID_PARAMS, format!("Invalid tools/call params: {e}"))
                    })?;
                let outcome = self
                    .coordinator
                    .dispatch(&params.name, params.arguments.unwrap_or(Value::Null))
                    .await;
                let result = ToolCallResult::from_outcome(outcome);
                serde_json::to_value(result)
                    .map_err(|e| RpcError::new(INVALID_PARAMS, e.to_string()))
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}
