use std::time::Duration;

use http::HeaderValue;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument as _, debug};
use url::Url;

use crate::jsonrpc::{JsonRpcId, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};
use crate::server::McpConnection;
use crate::sse::last_json_payload;
use crate::types::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, ListToolsParams,
    ListToolsResult,
};
use crate::{
    ACCEPT_STREAMABLE_HTTP, CONTENT_TYPE_JSON, CONTENT_TYPE_SSE, LEGACY_SESSION_ID_HEADER,
    PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER,
};

#[derive(Debug, Error)]
pub enum McpClientError {
    #[error("build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("could not connect to {endpoint}: {source}")]
    Connect {
        endpoint: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("http transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("mcp http status {status}")]
    Status { status: StatusCode, body: String },
    #[error("read response body: {0}")]
    Body(#[source] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("mcp json-rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("mcp client not ready (missing initialize)")]
    NotReady,
}

impl McpClientError {
    pub fn is_connect(&self) -> bool {
        matches!(self, McpClientError::Connect { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HttpMcpClientOptions {
    pub endpoint: Url,
    pub timeout: Duration,
}

impl HttpMcpClientOptions {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of one POST: whatever payload the body carried plus the session token.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub status: StatusCode,
    /// Last JSON payload found in the body, `None` when nothing parsed.
    pub message: Option<Value>,
    pub session_id: Option<String>,
}

/// MCP client over the streamable HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpMcpClient {
    http: reqwest::Client,
    endpoint: Url,
    protocol_version: Option<String>,
    session_id: Option<String>,
    next_id: i64,
    ready: bool,
}

impl HttpMcpClient {
    pub fn new(opts: HttpMcpClientOptions) -> Result<Self, McpClientError> {
        let http = reqwest::Client::builder()
            .timeout(opts.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(McpClientError::Build)?;
        Ok(Self {
            http,
            endpoint: opts.endpoint,
            protocol_version: None,
            session_id: None,
            next_id: 1,
            ready: false,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// POST one JSON-RPC envelope and read back the streamed answer.
    ///
    /// `session_id` is sent verbatim as `mcp-session-id`. Event-stream bodies
    /// are scanned line by line and the last `data:` payload that parses as
    /// JSON is kept; malformed lines are skipped. Nothing is retried.
    pub async fn exchange<T: Serialize + ?Sized>(
        &self,
        body: &T,
        session_id: Option<&str>,
    ) -> Result<Exchange, McpClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_STREAMABLE_HTTP));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        if let Some(sid) = session_id {
            match HeaderValue::from_str(sid) {
                Ok(v) => {
                    headers.insert(SESSION_ID_HEADER, v);
                }
                Err(_) => debug!("session id is not a valid header value; not sent"),
            }
        }
        if let Some(v) = self
            .protocol_version
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            headers.insert(PROTOCOL_VERSION_HEADER, v);
        }
        greeter_otel::inject_trace_headers(&mut headers);

        let resp = self
            .http
            .post(self.endpoint.clone())
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    McpClientError::Connect {
                        endpoint: self.endpoint.clone(),
                        source: e,
                    }
                } else {
                    McpClientError::Transport(e)
                }
            })?;

        let status = resp.status();
        let session_id = header_string(resp.headers(), SESSION_ID_HEADER)
            .or_else(|| header_string(resp.headers(), LEGACY_SESSION_ID_HEADER));
        let ct = header_string(resp.headers(), CONTENT_TYPE.as_str()).unwrap_or_default();

        let text = resp.text().await.map_err(McpClientError::Body)?;
        debug!(status = %status, content_type = %ct, bytes = text.len(), "mcp http response");

        if !status.is_success() {
            return Err(McpClientError::Status { status, body: text });
        }

        let message = if ct.starts_with(CONTENT_TYPE_JSON) {
            serde_json::from_str::<Value>(&text)
                .ok()
                .filter(|v| !v.is_null())
        } else {
            last_json_payload(&text)
        };
        if ct.starts_with(CONTENT_TYPE_SSE) && message.is_none() {
            debug!("event stream carried no parseable data line");
        }

        Ok(Exchange {
            status,
            message,
            session_id,
        })
    }

    /// Run the `initialize` handshake and send `notifications/initialized`.
    pub async fn initialize(
        &mut self,
        params: InitializeParams,
    ) -> Result<InitializeResult, McpClientError> {
        let span = tracing::info_span!("mcp.initialize", endpoint = %self.endpoint);
        async move {
            let (init, session_id): (InitializeResult, _) =
                self.request("initialize", Some(serde_json::to_value(params)?)).await?;
            if let Some(sid) = session_id {
                self.session_id = Some(sid);
            }
            self.protocol_version = Some(init.protocol_version.clone());

            self.notify(McpConnection::make_initialized_notification()).await?;
            self.ready = true;
            Ok::<_, McpClientError>(init)
        }
        .instrument(span)
        .await
    }

    pub async fn list_tools(
        &mut self,
        params: ListToolsParams,
    ) -> Result<ListToolsResult, McpClientError> {
        self.ensure_ready()?;
        let (res, _) = self
            .request("tools/list", Some(serde_json::to_value(params)?))
            .instrument(tracing::info_span!("mcp.list_tools"))
            .await?;
        Ok(res)
    }

    pub async fn call_tool(
        &mut self,
        params: CallToolParams,
    ) -> Result<CallToolResult, McpClientError> {
        self.ensure_ready()?;
        let span = tracing::info_span!("mcp.call_tool", tool = %params.name);
        let (res, _) = self
            .request("tools/call", Some(serde_json::to_value(params)?))
            .instrument(span)
            .await?;
        Ok(res)
    }

    fn ensure_ready(&self) -> Result<(), McpClientError> {
        if !self.ready {
            return Err(McpClientError::NotReady);
        }
        Ok(())
    }

    async fn notify(&self, n: JsonRpcNotification) -> Result<(), McpClientError> {
        // Servers answer 202 with an empty body; any success status is fine.
        self.exchange(&n, self.session_id.as_deref()).await?;
        Ok(())
    }

    async fn request<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(T, Option<String>), McpClientError> {
        let id = JsonRpcId::Number(self.next_id);
        self.next_id += 1;

        let req = JsonRpcRequest::new(id.clone(), method, params);
        let ex = self.exchange(&req, self.session_id.as_deref()).await?;
        let Some(payload) = ex.message else {
            return Err(McpClientError::UnexpectedResponse(format!(
                "no json-rpc payload in {method} response"
            )));
        };

        let JsonRpcMessage::Response(resp) = serde_json::from_value(payload)? else {
            return Err(McpClientError::UnexpectedResponse(
                "expected json-rpc response".to_string(),
            ));
        };
        if resp.id != id {
            return Err(McpClientError::UnexpectedResponse(format!(
                "response id {} does not match request id {id}",
                resp.id
            )));
        }
        if let Some(err) = resp.error {
            return Err(McpClientError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let Some(v) = resp.result else {
            return Err(McpClientError::UnexpectedResponse("missing result".to_string()));
        };
        Ok((serde_json::from_value(v)?, ex.session_id))
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::HeaderMap as AxumHeaders;
    use axum::response::IntoResponse;
    use axum::routing::post;

    use super::*;

    async fn spawn(app: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move { axum::serve(listener, app).await });
        Url::parse(&format!("http://{addr}/mcp")).expect("url")
    }

    fn client(url: Url) -> HttpMcpClient {
        HttpMcpClient::new(HttpMcpClientOptions::new(url)).expect("client")
    }

    fn ping() -> JsonRpcRequest {
        JsonRpcRequest::new(JsonRpcId::Number(1), "ping", None)
    }

    #[tokio::test]
    async fn sends_streamable_headers_and_echoes_session() {
        let app = Router::new().route(
            "/mcp",
            post(|headers: AxumHeaders| async move {
                let echo = serde_json::json!({
                    "accept": headers.get("accept").and_then(|v| v.to_str().ok()),
                    "session": headers.get("mcp-session-id").and_then(|v| v.to_str().ok()),
                });
                (
                    [("content-type", "text/event-stream"), ("mcp-session-id", "s-1")],
                    format!("event: message\ndata: {echo}\n\n"),
                )
                    .into_response()
            }),
        );
        let c = client(spawn(app).await);

        let ex = c.exchange(&ping(), Some("abc")).await.expect("exchange");
        assert_eq!(ex.status, StatusCode::OK);
        assert_eq!(ex.session_id.as_deref(), Some("s-1"));
        let msg = ex.message.expect("payload");
        assert_eq!(msg["accept"], ACCEPT_STREAMABLE_HTTP);
        assert_eq!(msg["session"], "abc");

        let ex = c.exchange(&ping(), None).await.expect("exchange");
        assert!(ex.message.expect("payload")["session"].is_null());
    }

    #[tokio::test]
    async fn legacy_session_header_and_json_body() {
        let app = Router::new().route(
            "/mcp",
            post(|| async {
                (
                    [("content-type", "application/json"), ("x-session-id", "old")],
                    r#"{"jsonrpc":"2.0","id":1,"result":{}}"#,
                )
            }),
        );
        let ex = client(spawn(app).await)
            .exchange(&ping(), None)
            .await
            .expect("exchange");
        assert_eq!(ex.session_id.as_deref(), Some("old"));
        assert_eq!(ex.message.expect("payload")["id"], 1);
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let app = Router::new().route(
            "/mcp",
            post(|| async { (StatusCode::BAD_REQUEST, "missing mcp-session-id") }),
        );
        let err = client(spawn(app).await)
            .exchange(&ping(), None)
            .await
            .expect_err("400");
        match err {
            McpClientError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "missing mcp-session-id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/mcp")).expect("url");
        let err = client(url)
            .exchange(&ping(), None)
            .await
            .expect_err("refused");
        assert!(err.is_connect());
    }

    #[tokio::test]
    async fn typed_request_rejects_mismatched_id() {
        let app = Router::new().route(
            "/mcp",
            post(|| async {
                (
                    [("content-type", "text/event-stream")],
                    "data: {\"jsonrpc\":\"2.0\",\"id\":99,\"result\":{}}\n\n",
                )
            }),
        );
        let mut c = client(spawn(app).await);
        let err = c
            .initialize(InitializeParams::new(
                crate::PROTOCOL_VERSION_LATEST,
                crate::Implementation::new("t", "0"),
            ))
            .await
            .expect_err("id mismatch");
        assert!(matches!(err, McpClientError::UnexpectedResponse(_)));
        assert!(!c.is_ready());
    }
}
