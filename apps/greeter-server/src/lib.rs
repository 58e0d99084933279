//! Greeting Server: one `greet` tool behind the MCP streamable HTTP or stdio transport.

mod greet;
mod streamable_http;
mod stdio;

use std::sync::Arc;

use greeter_mcp::{
    INVALID_REQUEST, JsonRpcError, JsonRpcId, JsonRpcMessage, JsonRpcResponse, McpHandler,
    McpServerConfig, PARSE_ERROR,
};
use serde_json::Value;

pub use greet::{GREET_TOOL, GreetingHandler, greet, greet_tool};
pub use streamable_http::{DEFAULT_SESSION_IDLE_TIMEOUT, HttpState, router, serve_http};
pub use stdio::run_stdio;

pub const SERVER_NAME: &str = "Greeting Server";

pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8000";

pub const DEFAULT_HTTP_PATH: &str = "/mcp";

pub fn server_config(strict_lifecycle: bool) -> McpServerConfig {
    McpServerConfig::new(SERVER_NAME, env!("CARGO_PKG_VERSION"))
        .with_strict_lifecycle(strict_lifecycle)
}

pub fn greeting_handler() -> Arc<dyn McpHandler> {
    Arc::new(GreetingHandler)
}

/// Decode one incoming frame (either transport), or produce the JSON-RPC error to send back.
pub(crate) fn decode_incoming(body: &str) -> Result<JsonRpcMessage, JsonRpcResponse> {
    let reject = |err: JsonRpcError| JsonRpcResponse::err(JsonRpcId::Null, err);

    let val: Value = serde_json::from_str(body)
        .map_err(|e| reject(JsonRpcError::new(PARSE_ERROR, "parse error").with_detail(e)))?;
    if val.is_array() {
        return Err(reject(JsonRpcError::new(
            INVALID_REQUEST,
            "batching not supported",
        )));
    }
    serde_json::from_value(val)
        .map_err(|e| reject(JsonRpcError::new(INVALID_REQUEST, "invalid request").with_detail(e)))
}
