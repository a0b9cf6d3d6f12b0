//! Hand-rolled MCP HTTP server for transport and provider tests.
//!
//! Each connection serves one request and closes. `GET` requests asking for
//! `text/event-stream` are held open and fed from [`SseSender`]; one stream
//! is live at a time, and [`MockMcpServer::end_sse`] hangs it up so the
//! client can reconnect.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex, Notify};

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn rpc_method(&self) -> String {
        self.json()
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn rpc_id(&self) -> Option<i64> {
        self.json().get("id").and_then(Value::as_i64)
    }
}

pub enum MockReply {
    Json(Value),
    Accepted,
    Status(u16, String),
    Raw {
        content_type: String,
        body: String,
    },
}

pub type SseSender = mpsc::UnboundedSender<String>;

type Handler = dyn Fn(&CapturedRequest, &SseSender) -> MockReply + Send + Sync;

pub struct MockMcpServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    sse: SseSender,
    sse_connected: watch::Receiver<bool>,
    sse_end: Arc<Notify>,
}

impl MockMcpServer {
    /// Starts the server. `session_id`, when set, is returned on every POST
    /// response as `Mcp-Session-Id`.
    pub async fn start<F>(session_id: Option<&str>, handler: F) -> Self
    where
        F: Fn(&CapturedRequest, &SseSender) -> MockReply + Send + Sync + 'static,
    {
        clear_proxy_env();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (sse, sse_rx) = mpsc::unbounded_channel();
        let (connected_tx, sse_connected) = watch::channel(false);

        let handler: Arc<Handler> = Arc::new(handler);
        let sse_rx = Arc::new(Mutex::new(sse_rx));
        let sse_end = Arc::new(Notify::new());
        let sse_end_for_server = Arc::clone(&sse_end);
        let connected_tx = Arc::new(connected_tx);
        let session_id = session_id.map(ToString::to_string);
        let captured = Arc::clone(&requests);
        let sse_for_handler = sse.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let handler = Arc::clone(&handler);
                let captured = Arc::clone(&captured);
                let sse_rx = Arc::clone(&sse_rx);
                let connected_tx = Arc::clone(&connected_tx);
                let session_id = session_id.clone();
                let sse = sse_for_handler.clone();
                let sse_end = Arc::clone(&sse_end_for_server);
                tokio::spawn(async move {
                    let _ = serve_connection(
                        stream,
                        handler,
                        captured,
                        sse,
                        SseFeed {
                            events: sse_rx,
                            connected: connected_tx,
                            end: sse_end,
                        },
                        session_id,
                    )
                    .await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            sse,
            sse_connected,
            sse_end,
        }
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn posts_for(&self, rpc_method: &str) -> Vec<CapturedRequest> {
        self.requests()
            .await
            .into_iter()
            .filter(|request| request.method == "POST" && request.rpc_method() == rpc_method)
            .collect()
    }

    pub fn push_sse(&self, raw: impl Into<String>) {
        let _ = self.sse.send(raw.into());
    }

    /// Ends the live SSE stream, or the next one to open.
    pub fn end_sse(&self) {
        self.sse_end.notify_one();
    }

    pub async fn sse_connects(&self) -> usize {
        self.requests()
            .await
            .iter()
            .filter(|request| request.method == "GET")
            .count()
    }

    pub async fn wait_for_sse(&self) {
        let mut connected = self.sse_connected.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            connected.wait_for(|connected| *connected),
        )
        .await
        .expect("SSE channel should connect")
        .expect("SSE watch should stay open");
    }
}

pub fn sse_message(value: &Value) -> String {
    format!("event: message\ndata: {value}\n\n")
}

pub fn initialize_reply(id: Option<i64>) -> MockReply {
    MockReply::Json(serde_json::json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(1),
        "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "prompts": {"listChanged": false},
                "tools": {},
                "resources": {}
            },
            "serverInfo": {"name": "mock", "version": "0.1.0"}
        }
    }))
}

pub fn clear_proxy_env() {
    for key in [
        "HTTP_PROXY",
        "http_proxy",
        "HTTPS_PROXY",
        "https_proxy",
        "ALL_PROXY",
        "all_proxy",
    ] {
        std::env::remove_var(key);
    }
    std::env::set_var("NO_PROXY", "*");
    std::env::set_var("no_proxy", "*");
}

struct SseFeed {
    events: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    connected: Arc<watch::Sender<bool>>,
    end: Arc<Notify>,
}

async fn serve_connection(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    sse: SseSender,
    feed: SseFeed,
    session_id: Option<String>,
) -> Result<(), String> {
    let request = read_http_request(&mut stream).await?;
    captured.lock().await.push(request.clone());

    if request.method == "GET" {
        let mut events = feed.events.lock().await;
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n",
            )
            .await
            .map_err(|err| err.to_string())?;
        stream.flush().await.map_err(|err| err.to_string())?;
        let _ = feed.connected.send(true);
        loop {
            tokio::select! {
                raw = events.recv() => {
                    let Some(raw) = raw else {
                        break;
                    };
                    if stream.write_all(raw.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = stream.flush().await;
                }
                _ = feed.end.notified() => break,
            }
        }
        let _ = feed.connected.send(false);
        return Ok(());
    }

    let reply = handler(&request, &sse);
    match reply {
        MockReply::Json(body) => {
            write_response(
                &mut stream,
                200,
                "application/json",
                &body.to_string(),
                session_id.as_deref(),
            )
            .await
        }
        MockReply::Accepted => {
            write_response(&mut stream, 202, "application/json", "", session_id.as_deref()).await
        }
        MockReply::Status(status, body) => {
            write_response(&mut stream, status, "text/plain", &body, None).await
        }
        MockReply::Raw { content_type, body } => {
            write_response(&mut stream, 200, &content_type, &body, session_id.as_deref()).await
        }
    }
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &str,
    session_id: Option<&str>,
) -> Result<(), String> {
    let reason = match status {
        200 => "OK",
        202 => "Accepted",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Error",
    };
    let session_header = session_id
        .map(|id| format!("mcp-session-id: {id}\r\n"))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: {content_type}\r\n{session_header}content-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|err| err.to_string())?;
    stream.flush().await.map_err(|err| err.to_string())
}

pub async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length.saturating_sub(body.len())];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        method,
        path,
        headers,
        body,
    })
}
