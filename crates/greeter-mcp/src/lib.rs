//! Model Context Protocol (MCP) primitives for the greeter client and server.
//!
//! Covers the pieces both binaries share:
//! - JSON-RPC 2.0 envelopes and the MCP payloads for `initialize`, `tools/list`
//!   and `tools/call`
//! - the per-session server state machine ([`McpConnection`])
//! - the streamable HTTP client ([`HttpMcpClient`]) and the SSE framing it reads

mod http_client;
mod jsonrpc;
mod server;
mod sse;
mod types;

pub use http_client::{Exchange, HttpMcpClient, HttpMcpClientOptions, McpClientError};
pub use jsonrpc::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, JsonRpcError, JsonRpcId,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
    NOT_INITIALIZED, PARSE_ERROR,
};
pub use server::{
    McpConnection, McpHandler, McpServerConfig, ToolArgumentError, negotiate_protocol_version,
};
pub use sse::{MESSAGE_EVENT, SseEvent, decode_sse_events, first_json_payload, last_json_payload};
pub use types::{
    CallToolParams, CallToolResult, ContentBlock, Implementation, InitializeParams,
    InitializeResult, ListToolsParams, ListToolsResult, McpClientInfo, McpServerInfo,
    ServerCapabilities, Tool, ToolsCapability,
};

/// Latest protocol version supported by this implementation.
pub const PROTOCOL_VERSION_LATEST: &str = "2025-11-25";

/// Protocol version sent by the demo client (the one most servers still accept).
pub const PROTOCOL_VERSION_2024_11_05: &str = "2024-11-05";

pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[
    PROTOCOL_VERSION_LATEST,
    "2025-06-18",
    "2025-03-26",
    PROTOCOL_VERSION_2024_11_05,
];

/// Header carrying the opaque session token issued on `initialize`.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Legacy session header some servers still emit.
pub const LEGACY_SESSION_ID_HEADER: &str = "x-session-id";

pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// `Accept` value for streamable HTTP: plain JSON or an event stream.
pub const ACCEPT_STREAMABLE_HTTP: &str = "application/json, text/event-stream";

pub const CONTENT_TYPE_JSON: &str = "application/json";

pub const CONTENT_TYPE_SSE: &str = "text/event-stream";
