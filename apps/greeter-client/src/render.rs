//! Console rendering of raw JSON-RPC payloads.
//!
//! Works on untyped JSON so a server that omits fields still prints something
//! sensible instead of failing to decode.

use serde_json::Value;

const UNKNOWN: &str = "unknown";

/// `(name, version)` from `result.serverInfo`, `unknown` where absent.
pub fn server_info(init: &Value) -> (String, String) {
    let info = &init["result"]["serverInfo"];
    (
        str_or(&info["name"], UNKNOWN),
        str_or(&info["version"], UNKNOWN),
    )
}

pub fn has_result(payload: &Value) -> bool {
    payload.get("result").is_some()
}

/// One `  - name: description` line per tool in `result.tools`.
pub fn tool_lines(list: &Value) -> Vec<String> {
    list["result"]["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .map(|t| {
                    format!(
                        "  - {}: {}",
                        str_or(&t["name"], UNKNOWN),
                        str_or(&t["description"], "N/A")
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Text of the first content block of a `tools/call` result.
///
/// `None` when the content list is empty or missing.
pub fn greeting_text(call: &Value) -> Option<String> {
    let first = call["result"]["content"].as_array()?.first()?;
    Some(str_or(&first["text"], "No response"))
}

fn str_or(v: &Value, default: &str) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => default.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn server_info_is_read_from_nested_result() {
        let v = json!({"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"Greeting Server","version":"0.1.0"}}});
        assert_eq!(
            server_info(&v),
            ("Greeting Server".to_string(), "0.1.0".to_string())
        );
    }

    #[test]
    fn server_info_defaults_to_unknown() {
        let v = json!({"jsonrpc":"2.0","id":1,"result":{}});
        assert_eq!(
            server_info(&v),
            ("unknown".to_string(), "unknown".to_string())
        );
    }

    #[test]
    fn tools_print_with_missing_description() {
        let v = json!({"result":{"tools":[
            {"name":"greet","description":"A simple greeting tool that says hello to someone."},
            {"name":"bare"},
            {}
        ]}});
        assert_eq!(
            tool_lines(&v),
            vec![
                "  - greet: A simple greeting tool that says hello to someone.",
                "  - bare: N/A",
                "  - unknown: N/A",
            ]
        );
    }

    #[test]
    fn empty_or_missing_tool_list_prints_nothing() {
        assert!(tool_lines(&json!({"result":{"tools":[]}})).is_empty());
        assert!(tool_lines(&json!({"result":{}})).is_empty());
    }

    #[test]
    fn greeting_text_handles_missing_parts() {
        let ok = json!({"result":{"content":[{"type":"text","text":"Hello, tea! Welcome to the FastMCP server!"}]}});
        assert_eq!(
            greeting_text(&ok).as_deref(),
            Some("Hello, tea! Welcome to the FastMCP server!")
        );
        assert_eq!(
            greeting_text(&json!({"result":{"content":[{"type":"image"}]}})).as_deref(),
            Some("No response")
        );
        assert!(greeting_text(&json!({"result":{"content":[]}})).is_none());
        assert!(greeting_text(&json!({"result":{}})).is_none());
    }

    #[test]
    fn has_result_ignores_error_responses() {
        assert!(has_result(&json!({"result":{}})));
        assert!(!has_result(&json!({"error":{"code":-32601,"message":"method not found"}})));
    }
}
