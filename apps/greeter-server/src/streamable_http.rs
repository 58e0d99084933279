use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use greeter_mcp::{
    CONTENT_TYPE_JSON, CONTENT_TYPE_SSE, JsonRpcMessage, JsonRpcResponse, McpConnection,
    McpHandler, McpServerConfig, PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER, SseEvent,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use tracing_opentelemetry::OpenTelemetrySpanExt as _;
use url::{Host, Url};
use uuid::Uuid;

use crate::decode_incoming;

/// Sessions untouched for this long are dropped the next time one is opened.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct Session {
    conn: McpConnection,
    last_seen: Instant,
}

type Sessions = Arc<Mutex<HashMap<String, Session>>>;

/// Shared listener state: the per-session connections plus what new ones are built from.
///
/// Clients rarely send DELETE, so idle sessions are swept whenever a new one
/// is opened.
#[derive(Clone)]
pub struct HttpState {
    cfg: McpServerConfig,
    handler: Arc<dyn McpHandler>,
    sessions: Sessions,
    idle_timeout: Duration,
}

impl HttpState {
    pub fn new(cfg: McpServerConfig, handler: Arc<dyn McpHandler>) -> Self {
        Self {
            cfg,
            handler,
            sessions: Sessions::default(),
            idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn connection(&self) -> McpConnection {
        McpConnection::new(self.cfg.clone(), self.handler.clone())
    }
}

/// Requests refused before any JSON-RPC processing happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
enum Rejection {
    #[error("origin not allowed")]
    Origin,
    #[error("invalid mcp-protocol-version")]
    ProtocolVersion,
    #[error("missing mcp-session-id")]
    MissingSession,
    #[error("unknown mcp-session-id")]
    UnknownSession,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = match self {
            Rejection::Origin => StatusCode::FORBIDDEN,
            Rejection::ProtocolVersion | Rejection::MissingSession => StatusCode::BAD_REQUEST,
            Rejection::UnknownSession => StatusCode::NOT_FOUND,
        };
        debug!(%status, reason = %self, "mcp request rejected");
        (status, self.to_string()).into_response()
    }
}

/// How a JSON-RPC response travels back, picked from the request's `Accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Json,
    EventStream,
}

impl Framing {
    fn negotiate(headers: &HeaderMap) -> Self {
        let wants_sse = headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains(CONTENT_TYPE_SSE));
        if wants_sse {
            Framing::EventStream
        } else {
            Framing::Json
        }
    }

    /// One `message` event, or the bare JSON document.
    fn respond(self, resp: &JsonRpcResponse, session_id: Option<&str>) -> Response {
        let json = match serde_json::to_string(resp) {
            Ok(s) => s,
            Err(e) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
            }
        };

        let mut out = match self {
            Framing::Json => {
                let mut r = Response::new(Body::from(json));
                r.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
                r
            }
            Framing::EventStream => {
                let mut r = Response::new(Body::from(SseEvent::message(json).encode()));
                let h = r.headers_mut();
                h.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_SSE));
                h.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
                r
            }
        };
        if let Some(v) = session_id.and_then(|s| HeaderValue::from_str(s).ok()) {
            out.headers_mut().insert(SESSION_ID_HEADER, v);
        }
        out
    }
}

pub fn router(path: &str, st: HttpState) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request| {
        let span = tracing::info_span!(
            "http.request",
            http_method = %req.method(),
            http_path = %req.uri().path(),
        );
        let _ = span.set_parent(greeter_otel::extract_trace_context(req.headers()));
        span
    });

    Router::new()
        .route(path, post(http_post).delete(http_delete).get(http_get))
        .layer(trace)
        .with_state(st)
}

/// Serve the MCP endpoint on an already-bound listener until `shutdown` resolves.
pub async fn serve_http(
    listener: TcpListener,
    path: &str,
    st: HttpState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("listener local addr")?;
    info!(%addr, %path, "greeting server listening");

    axum::serve(listener, router(path, st))
        .with_graceful_shutdown(shutdown)
        .await
        .context("serve mcp http")?;

    info!("greeting server stopped");
    Ok(())
}

async fn http_get() -> Response {
    // Nothing is ever pushed server-side.
    (StatusCode::METHOD_NOT_ALLOWED, "sse stream not supported").into_response()
}

async fn http_delete(State(st): State<HttpState>, headers: HeaderMap) -> Response {
    let sid = match session_header(&headers) {
        Ok(sid) => sid,
        Err(r) => return r.into_response(),
    };
    match st.sessions.lock().await.remove(sid) {
        Some(_) => {
            info!(session_id = %sid, "mcp session closed");
            StatusCode::ACCEPTED.into_response()
        }
        None => Rejection::UnknownSession.into_response(),
    }
}

async fn http_post(State(st): State<HttpState>, headers: HeaderMap, body: String) -> Response {
    if let Err(r) = check_preconditions(&headers) {
        return r.into_response();
    }
    let framing = Framing::negotiate(&headers);

    let msg = match decode_incoming(&body) {
        Ok(m) => m,
        Err(resp) => return framing.respond(&resp, None),
    };

    if matches!(&msg, JsonRpcMessage::Request(r) if r.method == "initialize") {
        return open_session(&st, msg, framing).await;
    }

    let sid = match session_header(&headers) {
        Ok(sid) => sid,
        Err(r) => return r.into_response(),
    };
    let mut sessions = st.sessions.lock().await;
    let Some(session) = sessions.get_mut(sid) else {
        return Rejection::UnknownSession.into_response();
    };
    session.last_seen = Instant::now();

    match session.conn.handle_message(msg).await {
        Some(resp) => framing.respond(&resp, Some(sid)),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Run `initialize` on a fresh connection and keep it only if the handshake succeeds.
async fn open_session(st: &HttpState, msg: JsonRpcMessage, framing: Framing) -> Response {
    let mut conn = st.connection();
    let Some(resp) = conn.handle_message(msg).await else {
        return StatusCode::ACCEPTED.into_response();
    };
    if resp.error.is_some() {
        return framing.respond(&resp, None);
    }

    let sid = Uuid::new_v4().to_string();
    let mut sessions = st.sessions.lock().await;
    let before = sessions.len();
    sessions.retain(|_, s| s.last_seen.elapsed() < st.idle_timeout);
    if sessions.len() < before {
        info!(expired = before - sessions.len(), "idle mcp sessions dropped");
    }
    sessions.insert(
        sid.clone(),
        Session {
            conn,
            last_seen: Instant::now(),
        },
    );
    drop(sessions);
    greeter_otel::metrics().record_session_opened();
    info!(session_id = %sid, "mcp session opened");
    framing.respond(&resp, Some(&sid))
}

fn check_preconditions(headers: &HeaderMap) -> Result<(), Rejection> {
    if let Some(origin) = header_str(headers, ORIGIN.as_str()) {
        if !origin.trim().is_empty() && !is_loopback_origin(origin) {
            return Err(Rejection::Origin);
        }
    }
    if header_str(headers, PROTOCOL_VERSION_HEADER).is_some_and(|v| v.trim().is_empty()) {
        return Err(Rejection::ProtocolVersion);
    }
    Ok(())
}

fn is_loopback_origin(origin: &str) -> bool {
    let Ok(url) = Url::parse(origin) else {
        return false;
    };
    match url.host() {
        Some(Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn session_header(headers: &HeaderMap) -> Result<&str, Rejection> {
    header_str(headers, SESSION_ID_HEADER).ok_or(Rejection::MissingSession)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}
