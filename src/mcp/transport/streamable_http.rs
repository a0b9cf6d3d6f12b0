//! Streamable HTTP transport: JSON-RPC over POST plus an SSE push channel.
//!
//! Every request is registered in the pending table before its POST goes
//! out. A reply can then arrive three ways: in the POST body, on an
//! event-stream POST response, or later on the SSE listener after the POST
//! answered with a placeholder such as `{"status":"queued"}`. Whichever
//! delivery resolves the entry first is the one the caller sees.
//!
//! The SSE listener is reopened on the next request if its stream ends. A
//! server that refuses the GET is taken to offer no push channel and is not
//! asked again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::http::{
    apply_session_id_header, apply_streamable_http_client_post_headers,
    apply_streamable_http_protocol_version_header, build_mcp_http_client, content_type,
    mcp_endpoint, session_id_from_headers, MCP_EVENT_STREAM_ACCEPT,
};
use super::sse::{is_event_stream_content_type, SseEvent, SseEventParser};
use super::{McpTransport, McpTransportKind};
use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{
    looks_like_response, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};
use crate::mcp::pending::{PendingRequest, PendingRequests};
use crate::mcp::METHOD_INITIALIZE;


const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MESSAGE_QUEUE_CAPACITY: usize = 64;
const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct StreamableHttpOptions {
    /// Deadline for a reply, whichever path delivers it.
    pub request_timeout: Duration,
    /// Capacity of the unsolicited-message queue. Messages arriving while it
    /// is full are dropped.
    pub message_queue_capacity: usize,
    /// How often the SSE listener sweeps expired pending requests.
    pub eviction_interval: Duration,
}

impl Default for StreamableHttpOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            message_queue_capacity: DEFAULT_MESSAGE_QUEUE_CAPACITY,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
        }
    }
}

struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

#[derive(Default)]
struct HttpSession {
    session_id: Option<String>,
    protocol_version: Option<String>,
}

pub struct StreamableHttpTransport {
    server_name: String,
    endpoint: reqwest::Url,
    options: StreamableHttpOptions,
    client: Mutex<Option<reqwest::Client>>,
    session: Mutex<HttpSession>,
    pending: Arc<PendingRequests>,
    listener: Mutex<Option<ListenerHandle>>,
    /// Set once `initialize` succeeded with a session id.
    listener_wanted: AtomicBool,
    /// Set when the server refused the SSE GET.
    push_unsupported: Arc<AtomicBool>,
    messages_tx: mpsc::Sender<JsonRpcMessage>,
    messages_rx: tokio::sync::Mutex<mpsc::Receiver<JsonRpcMessage>>,
    closed: AtomicBool,
    /// Cancelled by `close`; interrupts in-flight sends and the listener.
    shutdown: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StreamableHttpTransport {
    pub fn new(server_name: impl Into<String>, base_url: &str) -> Result<Self, McpError> {
        Self::with_options(server_name, base_url, StreamableHttpOptions::default())
    }

    pub fn with_options(
        server_name: impl Into<String>,
        base_url: &str,
        options: StreamableHttpOptions,
    ) -> Result<Self, McpError> {
        let endpoint = mcp_endpoint(base_url)?;
        let client = build_mcp_http_client()?;
        let (messages_tx, messages_rx) = mpsc::channel(options.message_queue_capacity.max(1));
        Ok(Self {
            server_name: server_name.into(),
            endpoint,
            options,
            client: Mutex::new(Some(client)),
            session: Mutex::new(HttpSession::default()),
            pending: PendingRequests::new(),
            listener: Mutex::new(None),
            listener_wanted: AtomicBool::new(false),
            push_unsupported: Arc::new(AtomicBool::new(false)),
            messages_tx,
            messages_rx: tokio::sync::Mutex::new(messages_rx),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    pub fn session_id(&self) -> Option<String> {
        lock(&self.session).session_id.clone()
    }

    /// True while the SSE listener task is alive.
    pub fn listener_started(&self) -> bool {
        lock(&self.listener)
            .as_ref()
            .is_some_and(ListenerHandle::is_running)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn client(&self) -> Result<reqwest::Client, McpError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpError::Closed);
        }
        lock(&self.client).clone().ok_or(McpError::Closed)
    }

    fn post(&self, client: &reqwest::Client, body: String) -> reqwest::RequestBuilder {
        let (session_id, protocol_version) = {
            let session = lock(&self.session);
            (session.session_id.clone(), session.protocol_version.clone())
        };
        let request = apply_streamable_http_client_post_headers(client.post(self.endpoint.clone()))
            .timeout(self.options.request_timeout)
            .body(body);
        let request = apply_session_id_header(request, session_id.as_deref());
        apply_streamable_http_protocol_version_header(request, protocol_version.as_deref())
    }

    fn remember_session_id(&self, response: &reqwest::Response) {
        if let Some(session_id) = session_id_from_headers(response.headers()) {
            let mut session = lock(&self.session);
            if session.session_id.as_deref() != Some(session_id.as_str()) {
                debug!(server = %self.server_name, session_id = %session_id, "Captured MCP session id");
                session.session_id = Some(session_id);
            }
        }
    }

    fn map_send_error(&self, id: RequestId, err: reqwest::Error) -> McpError {
        if err.is_timeout() {
            McpError::Timeout {
                id,
                after: self.options.request_timeout,
            }
        } else {
            McpError::Transport(format!(
                "MCP HTTP request to {} failed: {err}",
                self.endpoint
            ))
        }
    }

    async fn reply_from_body(
        &self,
        id: RequestId,
        body: &[u8],
        pending: PendingRequest,
    ) -> Result<JsonRpcResponse, McpError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            debug!(server = %self.server_name, request_id = id, "Empty MCP POST body; awaiting SSE delivery");
            return pending.wait().await;
        }

        let value: Value = serde_json::from_slice(body)?;
        if !looks_like_response(&value) {
            debug!(
                server = %self.server_name,
                request_id = id,
                body = %value,
                "MCP POST answered with a placeholder; awaiting SSE delivery"
            );
            return pending.wait().await;
        }

        match JsonRpcMessage::from_value(value)? {
            JsonRpcMessage::Response(response) if response.id() == id => {
                self.pending.resolve(response);
            }
            other => route_message(&self.server_name, &self.pending, &self.messages_tx, other),
        }
        pending.wait().await
    }

    async fn reply_from_event_stream(
        &self,
        id: RequestId,
        response: reqwest::Response,
        pending: PendingRequest,
    ) -> Result<JsonRpcResponse, McpError> {
        let mut stream = response.bytes_stream();
        let mut parser = SseEventParser::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| self.map_send_error(id, err))?;
            for event in parser.push(&chunk) {
                handle_event(&self.server_name, &self.pending, &self.messages_tx, event);
            }
            if !self.pending.contains(id) {
                return pending.wait().await;
            }
        }
        for event in parser.finish() {
            handle_event(&self.server_name, &self.pending, &self.messages_tx, event);
        }
        pending.wait().await
    }

    /// POSTs one registered request and waits for its reply on whichever
    /// path delivers it.
    async fn exchange(
        &self,
        client: &reqwest::Client,
        request: &JsonRpcRequest,
        body: String,
        pending: PendingRequest,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = request.id;
        debug!(server = %self.server_name, request_id = id, method = %request.method, "Posting MCP request");
        let response = self
            .post(client, body)
            .send()
            .await
            .map_err(|err| self.map_send_error(id, err))?;
        self.remember_session_id(&response);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "MCP server returned HTTP {status}: {}",
                body.trim()
            )));
        }

        if is_event_stream_content_type(content_type(response.headers())) {
            self.reply_from_event_stream(id, response, pending).await
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|err| self.map_send_error(id, err))?;
            self.reply_from_body(id, &body, pending).await
        }
    }

    /// Records the negotiated version and opens the SSE channel once a
    /// session id is known.
    fn after_initialize(&self, response: &JsonRpcResponse) {
        let JsonRpcResponse::Success { result, .. } = response else {
            return;
        };
        let session_id = {
            let mut session = lock(&self.session);
            if let Some(version) = result.get("protocolVersion").and_then(Value::as_str) {
                session.protocol_version = Some(version.to_string());
            }
            session.session_id.clone()
        };
        if let Some(session_id) = session_id {
            self.listener_wanted.store(true, Ordering::Release);
            self.start_listener(session_id);
        }
    }

    /// Reopens the SSE channel after its stream ended.
    fn restart_listener_if_ended(&self) {
        if !self.listener_wanted.load(Ordering::Acquire)
            || self.push_unsupported.load(Ordering::Acquire)
        {
            return;
        }
        if let Some(session_id) = self.session_id() {
            self.start_listener(session_id);
        }
    }

    fn start_listener(&self, session_id: String) {
        let Ok(client) = self.client() else {
            return;
        };
        let mut listener = lock(&self.listener);
        if listener.as_ref().is_some_and(ListenerHandle::is_running) {
            return;
        }
        let cancel = self.shutdown.child_token();
        let context = ListenerContext {
            server_name: self.server_name.clone(),
            endpoint: self.endpoint.clone(),
            client,
            session_id,
            protocol_version: lock(&self.session).protocol_version.clone(),
            pending: Arc::clone(&self.pending),
            messages_tx: self.messages_tx.clone(),
            eviction_interval: self.options.eviction_interval,
            cancel: cancel.clone(),
            push_unsupported: Arc::clone(&self.push_unsupported),
        };
        info!(server = %self.server_name, "Starting MCP SSE listener");
        let task = tokio::spawn(run_listener(context));
        *listener = Some(ListenerHandle { cancel, task });
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    fn kind(&self) -> McpTransportKind {
        McpTransportKind::StreamableHttp
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let client = self.client()?;
        let body = request.encode()?;
        // A close() racing this call seals the table, so registration fails
        // with Closed instead of leaving an entry nobody will complete.
        let pending = self.pending.register(request.id, self.options.request_timeout)?;
        self.restart_listener_if_ended();

        let reply = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(McpError::Closed),
            reply = self.exchange(&client, &request, body, pending) => reply,
        };
        let reply = match reply {
            Err(_) if self.is_closed() => return Err(McpError::Closed),
            reply => reply?,
        };
        if request.method == METHOD_INITIALIZE {
            self.after_initialize(&reply);
        }
        Ok(reply)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        let client = self.client()?;
        debug!(server = %self.server_name, method = %notification.method, "Posting MCP notification");
        let response = self
            .post(&client, notification.encode()?)
            .send()
            .await
            .map_err(|err| McpError::Transport(format!("MCP notification failed: {err}")))?;
        self.remember_session_id(&response);
        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Transport(format!(
                "MCP server returned HTTP {status} for {}",
                notification.method
            )));
        }
        Ok(())
    }

    async fn next_server_message(&self) -> Option<JsonRpcMessage> {
        self.messages_rx.lock().await.try_recv().ok()
    }

    async fn close(&self) -> Result<(), McpError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.cancel();
        if let Some(listener) = lock(&self.listener).take() {
            listener.cancel.cancel();
            drop(listener.task);
        }
        let failed = self.pending.seal();
        lock(&self.client).take();
        info!(server = %self.server_name, failed_pending = failed, "MCP HTTP transport closed");
        Ok(())
    }
}

impl Drop for StreamableHttpTransport {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.cancel.cancel();
        }
    }
}

struct ListenerContext {
    server_name: String,
    endpoint: reqwest::Url,
    client: reqwest::Client,
    session_id: String,
    protocol_version: Option<String>,
    pending: Arc<PendingRequests>,
    messages_tx: mpsc::Sender<JsonRpcMessage>,
    eviction_interval: Duration,
    cancel: CancellationToken,
    push_unsupported: Arc<AtomicBool>,
}

async fn run_listener(context: ListenerContext) {
    let request = context
        .client
        .get(context.endpoint.clone())
        .header("Accept", MCP_EVENT_STREAM_ACCEPT);
    let request = apply_session_id_header(request, Some(&context.session_id));
    let request =
        apply_streamable_http_protocol_version_header(request, context.protocol_version.as_deref());

    let response = tokio::select! {
        _ = context.cancel.cancelled() => return,
        response = request.send() => response,
    };
    let response = match response {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            context.push_unsupported.store(true, Ordering::Release);
            warn!(
                server = %context.server_name,
                status = %response.status(),
                "MCP server refused the SSE channel; replies must arrive on POST responses"
            );
            return;
        }
        Err(err) => {
            warn!(server = %context.server_name, error = %err, "MCP SSE channel failed to open");
            return;
        }
    };

    let mut stream = response.bytes_stream();
    let mut parser = SseEventParser::default();
    let mut eviction = tokio::time::interval(context.eviction_interval);
    loop {
        tokio::select! {
            _ = context.cancel.cancelled() => break,
            _ = eviction.tick() => {
                let evicted = context.pending.evict_expired();
                if evicted > 0 {
                    debug!(server = %context.server_name, evicted, "Evicted expired MCP requests");
                }
            }
            chunk = stream.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        for event in parser.push(&bytes) {
                            handle_event(&context.server_name, &context.pending, &context.messages_tx, event);
                        }
                    }
                    Some(Err(err)) => {
                        warn!(
                            server = %context.server_name,
                            error = %err,
                            "MCP SSE channel read failed; reopening on the next request"
                        );
                        break;
                    }
                    None => {
                        for event in parser.finish() {
                            handle_event(&context.server_name, &context.pending, &context.messages_tx, event);
                        }
                        warn!(server = %context.server_name, "MCP SSE channel ended; reopening on the next request");
                        break;
                    }
                }
            }
        }
    }
}

fn handle_event(
    server_name: &str,
    pending: &PendingRequests,
    messages_tx: &mpsc::Sender<JsonRpcMessage>,
    event: SseEvent,
) {
    if !event.is_message() {
        debug!(server = %server_name, event_type = ?event.event_type, "Skipping non-message SSE event");
        return;
    }
    match JsonRpcMessage::decode_str(&event.data) {
        Ok(message) => route_message(server_name, pending, messages_tx, message),
        Err(err) => {
            warn!(server = %server_name, error = %err, "Dropping malformed MCP SSE frame");
        }
    }
}

/// Resolves a pending request or queues the message as unsolicited. Never
/// blocks: a full queue drops the message.
fn route_message(
    server_name: &str,
    pending: &PendingRequests,
    messages_tx: &mpsc::Sender<JsonRpcMessage>,
    message: JsonRpcMessage,
) {
    if let JsonRpcMessage::Response(response) = &message {
        if pending.contains(response.id()) && pending.resolve(response.clone()) {
            return;
        }
    }
    match messages_tx.try_send(message) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(message)) => {
            warn!(server = %server_name, message = ?message, "MCP message queue full; dropping message");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(server = %server_name, "MCP message queue closed");
        }
    }
}
