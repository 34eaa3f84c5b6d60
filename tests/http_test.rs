mod helpers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use memory_bank::session::{SessionManager, Transport};
use memory_bank::tools::ToolService;
use memory_bank::transport::{http, Dispatcher};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct RawResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl RawResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

async fn start_server() -> SocketAddr {
    let sessions = Arc::new(SessionManager::new(Duration::from_secs(60)));
    let tools = ToolService::new(helpers::test_bank(), sessions, "main");
    let router = http::router(Dispatcher::new(tools, Transport::Http));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn send(addr: SocketAddr, method: &str, session: Option<&str>, body: Option<&Value>) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = body.map(Value::to_string).unwrap_or_default();
    let path = if method == "GET" { "/health" } else { "/mcp" };
    let mut request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
         Content-Type: application/json\r\nAccept: application/json\r\nContent-Length: {}\r\n",
        body.len()
    );
    if let Some(session) = session {
        request.push_str(&format!("{}: {session}\r\n", http::SESSION_HEADER));
    }
    request.push_str("\r\n");
    request.push_str(&body);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let mut lines = head.lines();
    let status = lines.next().unwrap().split(' ').nth(1).unwrap().parse().unwrap();
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    RawResponse {
        status,
        headers,
        body: body.to_string(),
    }
}

#[tokio::test]
async fn initialize_call_and_close_over_http() {
    let addr = start_server().await;

    let init = send(
        addr,
        "POST",
        None,
        Some(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})),
    )
    .await;
    assert_eq!(init.status, 200);
    let session = init.header(http::SESSION_HEADER).unwrap().to_string();
    assert_eq!(init.json()["result"]["protocolVersion"], "2025-03-26");

    let call = send(
        addr,
        "POST",
        Some(&session),
        Some(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                     "params": {"name": "init_memory_bank", "arguments": {"repository": "acme"}}})),
    )
    .await;
    assert_eq!(call.status, 200);
    let result = call.json();
    assert_eq!(result["id"], 2);
    assert_eq!(result["result"]["isError"], false);
    assert_eq!(result["result"]["structuredContent"]["created"], true);

    let health = send(addr, "GET", None, None).await;
    assert_eq!(health.json()["sessions"], 1);

    let closed = send(addr, "DELETE", Some(&session), None).await;
    assert_eq!(closed.status, 204);
    let again = send(addr, "DELETE", Some(&session), None).await;
    assert_eq!(again.status, 404);
}

#[tokio::test]
async fn calls_without_session_are_rejected() {
    let addr = start_server().await;
    let response = send(
        addr,
        "POST",
        None,
        Some(&json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call",
                     "params": {"name": "memory_bank_stats", "arguments": {"repository": "acme"}}})),
    )
    .await;
    assert_eq!(response.json()["error"]["code"], -32001);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = "{not json";
    let request = format!(
        "POST /mcp HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 400"));
    assert!(raw.contains("-32700"));
}
