//! Demo MCP client: initialize, list tools, then call `greet` once per name.
//!
//! Every failure is printed and ends the sequence early. Nothing is retried and
//! no error escapes to the caller except console write failures.

pub mod render;

use std::io::{self, Write};

use greeter_mcp::{
    HttpMcpClient, JsonRpcId, JsonRpcRequest, McpClientError, PROTOCOL_VERSION_2024_11_05,
};
use serde_json::{Value, json};
use tracing::{Instrument as _, debug};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000/mcp";

pub const DEFAULT_NAMES: [&str; 2] = ["tea", "stu"];

pub const CLIENT_NAME: &str = "test-client";

pub const CLIENT_VERSION: &str = "1.0";

/// How the demo sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoOutcome {
    Completed,
    InitializeFailed,
    ListToolsFailed,
}

/// POST one request and return the last payload in the response plus any session token.
///
/// Failures are written to `out` and collapse to `(None, None)`.
pub async fn send_mcp_request<W: Write>(
    client: &HttpMcpClient,
    request: &JsonRpcRequest,
    session_id: Option<&str>,
    out: &mut W,
) -> io::Result<(Option<Value>, Option<String>)> {
    let span = tracing::info_span!("mcp.request", method = %request.method, id = %request.id);
    let res = client.exchange(request, session_id).instrument(span).await;

    match res {
        Ok(ex) => {
            debug!(status = %ex.status, has_payload = ex.message.is_some(), "exchange done");
            Ok((ex.message, ex.session_id))
        }
        Err(McpClientError::Status { status, body }) => {
            writeln!(out, "Error: {}", status.as_u16())?;
            writeln!(out, "Response: {body}")?;
            Ok((None, None))
        }
        Err(e) if e.is_connect() => {
            writeln!(out, "[ERROR] Could not connect to server")?;
            writeln!(out, "Error: {e}")?;
            writeln!(out)?;
            writeln!(out, "Make sure the server is running:")?;
            writeln!(out, "  greeter-server")?;
            Ok((None, None))
        }
        Err(e) => {
            writeln!(out, "Error in request: {e}")?;
            Ok((None, None))
        }
    }
}

fn initialize_request() -> JsonRpcRequest {
    JsonRpcRequest::new(
        JsonRpcId::Number(1),
        "initialize",
        Some(json!({
            "protocolVersion": PROTOCOL_VERSION_2024_11_05,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": CLIENT_VERSION
            }
        })),
    )
}

fn list_tools_request() -> JsonRpcRequest {
    JsonRpcRequest::new(JsonRpcId::Number(2), "tools/list", Some(json!({})))
}

fn greet_request(id: i64, name: &str) -> JsonRpcRequest {
    JsonRpcRequest::new(
        JsonRpcId::Number(id),
        "tools/call",
        Some(json!({
            "name": "greet",
            "arguments": { "name": name }
        })),
    )
}

/// Run the fixed sequence against `client`, printing progress to `out`.
pub async fn run_demo<W: Write>(
    client: &HttpMcpClient,
    names: &[String],
    out: &mut W,
) -> io::Result<DemoOutcome> {
    writeln!(out, "Connecting to MCP server at {}...", client.endpoint())?;
    writeln!(out)?;
    writeln!(out, "Initializing connection...")?;
    writeln!(out)?;

    let (init, session_id) = send_mcp_request(client, &initialize_request(), None, out).await?;
    let Some(init) = init else {
        writeln!(out, "Failed to initialize server connection")?;
        return Ok(DemoOutcome::InitializeFailed);
    };

    let (name, version) = render::server_info(&init);
    writeln!(out, "[OK] Connected to MCP server")?;
    writeln!(out)?;
    writeln!(out, "Server name: {name}")?;
    writeln!(out, "Server version: {version}")?;
    writeln!(out)?;
    writeln!(out, "Session ID: {}", session_id.as_deref().unwrap_or("None"))?;
    writeln!(out)?;

    writeln!(out, "Fetching available tools...")?;
    writeln!(out)?;
    let sid = session_id.as_deref();
    let (tools, _) = send_mcp_request(client, &list_tools_request(), sid, out).await?;
    let tools = match tools {
        Some(t) if render::has_result(&t) => t,
        other => {
            writeln!(out, "Error listing tools")?;
            if let Some(resp) = other {
                writeln!(out, "Response: {resp}")?;
            }
            return Ok(DemoOutcome::ListToolsFailed);
        }
    };

    writeln!(out, "Available tools:")?;
    for line in render::tool_lines(&tools) {
        writeln!(out, "{line}")?;
    }
    writeln!(out)?;

    for (idx, name) in names.iter().enumerate() {
        let id = 3 + idx as i64;
        let (result, _) = send_mcp_request(client, &greet_request(id, name), sid, out).await?;

        match result {
            Some(r) if render::has_result(&r) => {
                writeln!(out, "Greeting for {name}:")?;
                match render::greeting_text(&r) {
                    Some(text) => writeln!(out, "  {text}")?,
                    None => writeln!(out, "  (No response)")?,
                }
                writeln!(out)?;
            }
            other => {
                writeln!(out, "Error calling tool for {name}")?;
                if let Some(resp) = other {
                    writeln!(out, "Response: {resp}")?;
                }
            }
        }
    }

    Ok(DemoOutcome::Completed)
}
