use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::jsonrpc::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
    NOT_INITIALIZED,
};
use crate::types::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, ListToolsParams,
    ListToolsResult, McpServerInfo, ServerCapabilities, ToolsCapability,
};
use crate::{PROTOCOL_VERSION_LATEST, SUPPORTED_PROTOCOL_VERSIONS};

const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// Tool implementations behind a connection.
#[async_trait]
pub trait McpHandler: Send + Sync {
    async fn list_tools(&self, params: ListToolsParams) -> anyhow::Result<ListToolsResult>;
    async fn call_tool(&self, params: CallToolParams) -> anyhow::Result<CallToolResult>;
}

/// Returned by a handler when tool arguments are missing or ill-typed.
///
/// Surfaces as a JSON-RPC `invalid params` error instead of `internal error`.
#[derive(Debug, thiserror::Error)]
#[error("invalid arguments for tool `{tool}`: {detail}")]
pub struct ToolArgumentError {
    pub tool: String,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub server_info: McpServerInfo,
    pub instructions: Option<String>,
    /// Require `notifications/initialized` before serving `tools/*`.
    ///
    /// Off by default: plain clients often go straight from the `initialize`
    /// response to `tools/list`.
    pub strict_lifecycle: bool,
}

impl McpServerConfig {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            server_info: McpServerInfo::new(name, version),
            instructions: None,
            strict_lifecycle: false,
        }
    }

    pub fn with_strict_lifecycle(mut self, strict: bool) -> Self {
        self.strict_lifecycle = strict;
        self
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: false,
            }),
        }
    }
}

/// Echo the requested version when supported, otherwise offer the latest.
pub fn negotiate_protocol_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| *v == requested)
        .unwrap_or(PROTOCOL_VERSION_LATEST)
}

/// Where a session is in the handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    AwaitingInitialize,
    Initialized,
    Operating,
}

/// One MCP session: lifecycle enforcement plus method routing to an [`McpHandler`].
pub struct McpConnection {
    cfg: McpServerConfig,
    handler: Arc<dyn McpHandler>,
    phase: Phase,
    protocol_version: Option<&'static str>,
}

impl McpConnection {
    pub fn new(cfg: McpServerConfig, handler: Arc<dyn McpHandler>) -> Self {
        Self {
            cfg,
            handler,
            phase: Phase::AwaitingInitialize,
            protocol_version: None,
        }
    }

    /// Version agreed during `initialize`, if it has happened.
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version
    }

    /// True once the client has sent `notifications/initialized`.
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Operating
    }

    pub fn make_initialized_notification() -> JsonRpcNotification {
        JsonRpcNotification::new(INITIALIZED_NOTIFICATION, None)
    }

    /// Feed one decoded message through the session.
    ///
    /// Requests always get a response; notifications and stray responses get `None`.
    pub async fn handle_message(&mut self, msg: JsonRpcMessage) -> Option<JsonRpcResponse> {
        match msg {
            JsonRpcMessage::Request(req) => {
                let id = req.id.clone();
                Some(match self.dispatch(req).await {
                    Ok(result) => JsonRpcResponse::ok(id, result),
                    Err(err) => JsonRpcResponse::err(id, err),
                })
            }
            JsonRpcMessage::Notification(n) => {
                self.on_notification(&n);
                None
            }
            JsonRpcMessage::Response(r) => {
                debug!(id = %r.id, "ignoring unsolicited response");
                None
            }
        }
    }

    async fn dispatch(&mut self, req: JsonRpcRequest) -> Result<Value, JsonRpcError> {
        if req.jsonrpc != JSONRPC_VERSION {
            return Err(JsonRpcError::new(INVALID_REQUEST, "invalid jsonrpc version"));
        }
        debug!(method = %req.method, id = %req.id, "mcp request");

        match req.method.as_str() {
            "initialize" => {
                let params = required_params::<InitializeParams>(req.params)?;
                self.initialize(params)
            }
            "ping" => Ok(Value::Object(Default::default())),
            "tools/list" => {
                self.require_tools_phase()?;
                let params = req
                    .params
                    .map(parse_params::<ListToolsParams>)
                    .transpose()?
                    .unwrap_or_default();
                let res = self.handler.list_tools(params).await.map_err(internal)?;
                to_result(res)
            }
            "tools/call" => {
                self.require_tools_phase()?;
                let params = required_params::<CallToolParams>(req.params)?;
                let tool = params.name.clone();
                match self.handler.call_tool(params).await {
                    Ok(res) => to_result(res),
                    Err(e) if e.is::<ToolArgumentError>() => {
                        Err(JsonRpcError::new(INVALID_PARAMS, "invalid params").with_detail(e))
                    }
                    Err(e) => {
                        warn!(tool = %tool, error = %e, "tool call failed");
                        Err(internal(e))
                    }
                }
            }
            _ => Err(JsonRpcError::new(METHOD_NOT_FOUND, "method not found")),
        }
    }

    fn initialize(&mut self, params: InitializeParams) -> Result<Value, JsonRpcError> {
        if self.phase != Phase::AwaitingInitialize {
            return Err(JsonRpcError::new(INVALID_REQUEST, "already initialized"));
        }

        let negotiated = negotiate_protocol_version(&params.protocol_version);
        debug!(
            client = %params.client_info.name,
            requested = %params.protocol_version,
            negotiated,
            "mcp initialize"
        );
        self.protocol_version = Some(negotiated);
        self.phase = Phase::Initialized;

        to_result(InitializeResult {
            protocol_version: negotiated.to_string(),
            capabilities: self.cfg.capabilities(),
            server_info: self.cfg.server_info.clone(),
            instructions: self.cfg.instructions.clone(),
        })
    }

    fn require_tools_phase(&self) -> Result<(), JsonRpcError> {
        let allowed = match self.phase {
            Phase::Operating => true,
            Phase::Initialized => !self.cfg.strict_lifecycle,
            Phase::AwaitingInitialize => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(JsonRpcError::new(NOT_INITIALIZED, "not initialized"))
        }
    }

    fn on_notification(&mut self, n: &JsonRpcNotification) {
        if n.jsonrpc != JSONRPC_VERSION {
            return;
        }
        if n.method == INITIALIZED_NOTIFICATION && self.phase == Phase::Initialized {
            self.phase = Phase::Operating;
        }
    }
}

fn parse_params<T: DeserializeOwned>(v: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(v)
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, "invalid params").with_detail(e))
}

fn required_params<T: DeserializeOwned>(v: Option<Value>) -> Result<T, JsonRpcError> {
    let v = v.ok_or_else(|| {
        JsonRpcError::new(INVALID_PARAMS, "invalid params").with_detail("missing params")
    })?;
    parse_params(v)
}

fn to_result<T: Serialize>(v: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(v).map_err(internal)
}

fn internal(e: impl std::fmt::Display) -> JsonRpcError {
    JsonRpcError::new(INTERNAL_ERROR, "internal error").with_detail(e)
}
