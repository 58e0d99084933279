use std::time::Duration;

use greeter_mcp::{
    CallToolParams, HttpMcpClient, HttpMcpClientOptions, Implementation, InitializeParams,
    ListToolsParams, McpClientError, PROTOCOL_VERSION_LATEST,
};
use greeter_server::{HttpState, greeting_handler, serve_http, server_config};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use url::Url;

struct TestServer {
    url: Url,
    state: HttpState,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

async fn start(strict: bool) -> TestServer {
    start_with(HttpState::new(server_config(strict), greeting_handler())).await
}

async fn start_with(state: HttpState) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = oneshot::channel::<()>();
    let st = state.clone();
    tokio::spawn(async move {
        serve_http(listener, "/mcp", st, async move {
            let _ = rx.await;
        })
        .await
    });
    TestServer {
        url: Url::parse(&format!("http://{addr}/mcp")).expect("url"),
        state,
        stop: Some(tx),
    }
}

fn init_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0" }
        }
    })
}

async fn post(
    http: &reqwest::Client,
    url: &Url,
    accept: &str,
    session: Option<&str>,
    body: &Value,
) -> reqwest::Response {
    let mut req = http
        .post(url.clone())
        .header("accept", accept)
        .header("content-type", "application/json")
        .json(body);
    if let Some(sid) = session {
        req = req.header("mcp-session-id", sid);
    }
    req.send().await.expect("send")
}

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

#[tokio::test]
async fn initialize_opens_session_and_answers_as_event_stream() {
    let srv = start(false).await;
    let http = reqwest::Client::new();

    let resp = post(&http, &srv.url, ACCEPT_BOTH, None, &init_body()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .expect("header str")
            .starts_with("text/event-stream")
    );
    let sid = resp.headers()["mcp-session-id"]
        .to_str()
        .expect("header str")
        .to_string();
    let body = resp.text().await.expect("body");
    assert!(body.starts_with("event: message\n"));

    let msg = greeter_mcp::first_json_payload(&body).expect("sse payload");
    assert_eq!(msg["id"], 1);
    assert_eq!(msg["result"]["serverInfo"]["name"], "Greeting Server");
    assert_eq!(msg["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(srv.state.session_count().await, 1);

    let list = json!({"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}});
    let resp = post(&http, &srv.url, ACCEPT_BOTH, Some(&sid), &list).await;
    let body = resp.text().await.expect("body");
    let msg = greeter_mcp::last_json_payload(&body).expect("payload");
    assert_eq!(msg["result"]["tools"][0]["name"], "greet");
}

#[tokio::test]
async fn json_accept_gets_plain_json() {
    let srv = start(false).await;
    let http = reqwest::Client::new();

    let resp = post(&http, &srv.url, "application/json", None, &init_body()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .expect("header str")
            .starts_with("application/json")
    );
    let v: Value = resp.json().await.expect("json body");
    assert_eq!(v["result"]["serverInfo"]["name"], "Greeting Server");
}

#[tokio::test]
async fn rejected_initialize_opens_no_session() {
    let srv = start(false).await;
    let http = reqwest::Client::new();
    let bad = json!({"jsonrpc":"2.0","id":1,"method":"initialize"});

    let resp = post(&http, &srv.url, ACCEPT_BOTH, None, &bad).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("mcp-session-id").is_none());
    let msg = greeter_mcp::last_json_payload(&resp.text().await.expect("body")).expect("payload");
    assert_eq!(msg["error"]["code"], -32602);
    assert_eq!(srv.state.session_count().await, 0);
}

#[tokio::test]
async fn requests_outside_a_session_are_rejected() {
    let srv = start(false).await;
    let http = reqwest::Client::new();
    let list = json!({"jsonrpc":"2.0","id":2,"method":"tools/list"});

    let resp = post(&http, &srv.url, ACCEPT_BOTH, None, &list).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = post(&http, &srv.url, ACCEPT_BOTH, Some("no-such-session"), &list).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_yields_parse_error_payload() {
    let srv = start(false).await;
    let resp = reqwest::Client::new()
        .post(srv.url.clone())
        .header("accept", ACCEPT_BOTH)
        .header("content-type", "application/json")
        .body("{oops")
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), StatusCode::OK);
    let msg = greeter_mcp::last_json_payload(&resp.text().await.expect("body")).expect("payload");
    assert_eq!(msg["error"]["code"], -32700);
}

#[tokio::test]
async fn notifications_are_accepted_and_delete_ends_session() {
    let srv = start(true).await;
    let http = reqwest::Client::new();

    let resp = post(&http, &srv.url, ACCEPT_BOTH, None, &init_body()).await;
    let sid = resp.headers()["mcp-session-id"]
        .to_str()
        .expect("header str")
        .to_string();

    let n = json!({"jsonrpc":"2.0","method":"notifications/initialized"});
    let resp = post(&http, &srv.url, ACCEPT_BOTH, Some(&sid), &n).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = http
        .delete(srv.url.clone())
        .header("mcp-session-id", &sid)
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(srv.state.session_count().await, 0);

    let list = json!({"jsonrpc":"2.0","id":2,"method":"tools/list"});
    let resp = post(&http, &srv.url, ACCEPT_BOTH, Some(&sid), &list).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

fn session_of(resp: &reqwest::Response) -> String {
    resp.headers()["mcp-session-id"]
        .to_str()
        .expect("header str")
        .to_string()
}

#[tokio::test]
async fn idle_sessions_are_dropped_when_a_new_one_opens() {
    let state = HttpState::new(server_config(false), greeting_handler())
        .with_idle_timeout(Duration::ZERO);
    let srv = start_with(state).await;
    let http = reqwest::Client::new();

    let first = session_of(&post(&http, &srv.url, ACCEPT_BOTH, None, &init_body()).await);
    let second = session_of(&post(&http, &srv.url, ACCEPT_BOTH, None, &init_body()).await);
    assert_ne!(first, second);
    assert_eq!(srv.state.session_count().await, 1);

    let list = json!({"jsonrpc":"2.0","id":2,"method":"tools/list"});
    let resp = post(&http, &srv.url, ACCEPT_BOTH, Some(&first), &list).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = post(&http, &srv.url, ACCEPT_BOTH, Some(&second), &list).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn get_is_not_allowed_and_foreign_origin_is_forbidden() {
    let srv = start(false).await;
    let http = reqwest::Client::new();

    let resp = http.get(srv.url.clone()).send().await.expect("send");
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = http
        .post(srv.url.clone())
        .header("origin", "https://evil.example")
        .json(&init_body())
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn typed_client_completes_strict_lifecycle() {
    let srv = start(true).await;
    let mut client =
        HttpMcpClient::new(HttpMcpClientOptions::new(srv.url.clone())).expect("client");

    let err = client
        .list_tools(ListToolsParams::default())
        .await
        .expect_err("not ready yet");
    assert!(matches!(err, McpClientError::NotReady));

    let init = client
        .initialize(InitializeParams::new(
            PROTOCOL_VERSION_LATEST,
            Implementation::new("typed", "0.1.0"),
        ))
        .await
        .expect("initialize");
    assert_eq!(init.server_info.name, "Greeting Server");
    assert!(client.is_ready());
    assert!(client.session_id().is_some());

    let tools = client
        .list_tools(ListToolsParams::default())
        .await
        .expect("list");
    assert_eq!(tools.tools.len(), 1);
    assert_eq!(
        tools.tools[0].description.as_deref(),
        Some("A simple greeting tool that says hello to someone.")
    );

    let res = client
        .call_tool(CallToolParams::new("greet", json!({ "name": "tea" })))
        .await
        .expect("call");
    assert_eq!(
        res.first_text(),
        Some("Hello, tea! Welcome to the FastMCP server!")
    );

    let err = client
        .call_tool(CallToolParams::new("greet", json!({})))
        .await
        .expect_err("missing name");
    assert!(matches!(err, McpClientError::Rpc { code: -32602, .. }));
}
