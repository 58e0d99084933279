use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// MCP-specific: a request arrived before the lifecycle handshake finished.
pub const NOT_INITIALIZED: i64 = -32002;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
    Null,
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{n}"),
            JsonRpcId::String(s) => f.write_str(s),
            JsonRpcId::Null => f.write_str("null"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: JsonRpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: JsonRpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a human-readable cause as `data.detail`.
    pub fn with_detail(mut self, detail: impl std::fmt::Display) -> Self {
        self.data = Some(serde_json::json!({ "detail": detail.to_string() }));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: JsonRpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Any single JSON-RPC envelope.
///
/// Variant order matters for untagged decoding: a request carries both `id` and
/// `method`, a notification only `method`, a response only `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.method),
            JsonRpcMessage::Notification(n) => Some(&n.method),
            JsonRpcMessage::Response(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_with_id_is_not_a_notification() {
        let m: JsonRpcMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"greet"}}"#,
        )
        .expect("decode");
        let JsonRpcMessage::Request(r) = m else {
            panic!("expected request");
        };
        assert_eq!(r.id, JsonRpcId::Number(3));
        assert_eq!(r.method, "tools/call");
    }

    #[test]
    fn notification_has_no_id() {
        let m: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .expect("decode");
        assert!(matches!(m, JsonRpcMessage::Notification(_)));
        assert_eq!(m.method(), Some("notifications/initialized"));
    }

    #[test]
    fn error_response_decodes() {
        let m: JsonRpcMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"abc","error":{"code":-32601,"message":"method not found"}}"#,
        )
        .expect("decode");
        let JsonRpcMessage::Response(r) = m else {
            panic!("expected response");
        };
        assert_eq!(r.id, JsonRpcId::String("abc".to_string()));
        assert_eq!(r.error.map(|e| e.code), Some(METHOD_NOT_FOUND));
        assert!(r.result.is_none());
    }

    #[test]
    fn ok_response_omits_error_member() {
        let r = JsonRpcResponse::ok(JsonRpcId::Number(1), serde_json::json!({}));
        let v = serde_json::to_value(&r).expect("serialize");
        assert!(v.get("error").is_none());
        assert_eq!(v["jsonrpc"], "2.0");
    }
}
