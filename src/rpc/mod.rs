// ABOUTME: RPC module - JSON-RPC 2.0 over line-delimited streams.
// ABOUTME: Lets external processes call coordinator operations as tools.

mod server;
mod types;

pub use server::RpcServer;
pub use types::{
    ContentBlock, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND,
    PARSE_ERROR, PROTOCOL_VERSION, RpcError, RpcRequest, RpcResponse, ToolCallParams,
    ToolCallResult,
};

#[cfg(test)]
mod server_test;
