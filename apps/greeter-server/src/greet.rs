use greeter_mcp::{
    CallToolParams, CallToolResult, ListToolsParams, ListToolsResult, McpHandler, Tool,
    ToolArgumentError,
};
use serde::Deserialize;
use serde_json::json;
use tracing::Instrument as _;

pub const GREET_TOOL: &str = "greet";

/// The greeting the `greet` tool returns. No validation; any string is accepted.
pub fn greet(name: &str) -> String {
    format!("Hello, {name}! Welcome to the FastMCP server!")
}

pub fn greet_tool() -> Tool {
    Tool::new(
        GREET_TOOL,
        "A simple greeting tool that says hello to someone.",
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The name of the person to greet"
                }
            },
            "required": ["name"]
        }),
    )
}

#[derive(Debug, Deserialize)]
struct GreetArgs {
    name: String,
}

pub struct GreetingHandler;

#[async_trait::async_trait]
impl McpHandler for GreetingHandler {
    async fn list_tools(&self, _params: ListToolsParams) -> anyhow::Result<ListToolsResult> {
        Ok(vec![greet_tool()].into())
    }

    async fn call_tool(&self, params: CallToolParams) -> anyhow::Result<CallToolResult> {
        let tool = params.name.clone();
        async move {
            if params.name != GREET_TOOL {
                greeter_otel::metrics().record_tool_call(&params.name, false);
                return Ok(CallToolResult::error_text(format!(
                    "Unknown tool: {}",
                    params.name
                )));
            }

            let args = params.arguments.unwrap_or_else(|| json!({}));
            let args: GreetArgs = serde_json::from_value(args).map_err(|e| ToolArgumentError {
                tool: GREET_TOOL.to_string(),
                detail: e.to_string(),
            })?;

            let text = greet(&args.name);
            greeter_otel::metrics().record_tool_call(GREET_TOOL, true);
            let structured = json!({ "result": text });
            Ok::<_, anyhow::Error>(CallToolResult::text(text).with_structured(structured))
        }
        .instrument(tracing::info_span!("greeter.call_tool", tool = %tool))
        .await
    }
}
