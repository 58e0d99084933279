use std::sync::Arc;

use greeter_mcp::{
    JsonRpcError, JsonRpcId, JsonRpcResponse, McpConnection, McpHandler, McpServerConfig,
    PARSE_ERROR,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tracing::{info, warn};

use crate::decode_incoming;

/// Newline-delimited JSON-RPC over a reader/writer pair (stdin/stdout in the binary).
///
/// Runs a single session until the reader hits EOF.
pub async fn run_stdio<R, W>(
    cfg: McpServerConfig,
    handler: Arc<dyn McpHandler>,
    mut reader: R,
    mut writer: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut conn = McpConnection::new(cfg, handler);
    let mut buf = Vec::new();
    info!("serving MCP over stdio");

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "stdin line is not utf-8");
                write_jsonrpc(&mut writer, &not_utf8(e)).await?;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match decode_incoming(line) {
            Ok(msg) => conn.handle_message(msg).await,
            Err(resp) => Some(resp),
        };
        if let Some(resp) = resp {
            write_jsonrpc(&mut writer, &resp).await?;
        }
    }

    info!("stdin closed");
    Ok(())
}

fn not_utf8(e: std::str::Utf8Error) -> JsonRpcResponse {
    JsonRpcResponse::err(
        JsonRpcId::Null,
        JsonRpcError::new(PARSE_ERROR, "parse error").with_detail(e),
    )
}

async fn write_jsonrpc<W: AsyncWrite + Unpin>(
    writer: &mut W,
    resp: &JsonRpcResponse,
) -> anyhow::Result<()> {
    let out = serde_json::to_string(resp)?;
    writer.write_all(out.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
