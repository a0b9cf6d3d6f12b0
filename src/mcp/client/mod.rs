//! Provider façade over a single MCP transport.
//!
//! Every operation first runs (or joins) the initialization handshake, then
//! sends one JSON-RPC request and decodes the result into a
//! `rust_mcp_schema` type. Remote error replies surface as
//! [`McpError::Protocol`]; transport faults keep their own variants.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_mcp_schema::{Implementation, InitializeResult, ServerCapabilities};
use serde_json::Value;
use tracing::{debug, info};

use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestIdGenerator};
use crate::mcp::session::{SessionPhase, SessionState};
use crate::mcp::transport::{McpTransport, McpTransportKind};
use crate::mcp::{METHOD_INITIALIZE, METHOD_NOTIFICATIONS_INITIALIZED};

mod operations;
pub(crate) mod protocol;


use protocol::{initialize_params, parse_initialize_result};

/// Upper bound on pages fetched by one list operation.
const MCP_MAX_LIST_PAGES: usize = 32;

pub struct McpProvider {
    name: String,
    transport: Arc<dyn McpTransport>,
    ids: Arc<RequestIdGenerator>,
    session: SessionState,
    closed: AtomicBool,
}

impl McpProvider {
    pub fn new(name: impl Into<String>, transport: Arc<dyn McpTransport>) -> Self {
        Self {
            name: name.into(),
            transport,
            ids: Arc::new(RequestIdGenerator::new()),
            session: SessionState::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport_kind(&self) -> McpTransportKind {
        self.transport.kind()
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// True after [`McpProvider::close`] or once the transport has failed
    /// for good, e.g. a stdio server that exited.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.transport.is_closed()
    }

    fn ensure_open(&self) -> Result<(), McpError> {
        if self.is_closed() {
            Err(McpError::Closed)
        } else {
            Ok(())
        }
    }

    /// Runs the handshake if it has not completed yet and returns the cached
    /// result. Concurrent callers share one attempt; a failed attempt is
    /// retried by the next call.
    pub async fn initialize(&self) -> Result<Arc<InitializeResult>, McpError> {
        self.ensure_open()?;
        let name = self.name.clone();
        let transport = Arc::clone(&self.transport);
        let ids = Arc::clone(&self.ids);
        self.session
            .ensure_initialized(move || handshake(name, transport, ids))
            .await
    }

    pub async fn capabilities(&self) -> Result<ServerCapabilities, McpError> {
        Ok(self.initialize().await?.capabilities.clone())
    }

    pub async fn server_info(&self) -> Result<Implementation, McpError> {
        Ok(self.initialize().await?.server_info.clone())
    }

    /// Next unsolicited server message, if one is queued. Only the
    /// streamable HTTP transport produces these.
    pub async fn next_server_message(&self) -> Option<JsonRpcMessage> {
        self.transport.next_server_message().await
    }

    /// Closes the transport. Later operations fail with
    /// [`McpError::Closed`]; closing twice is a no-op.
    pub async fn close(&self) -> Result<(), McpError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(provider = %self.name, transport = %self.transport.kind(), "Closing MCP provider");
        self.transport.close().await
    }

    /// Sends `method` after initialization and returns the raw result.
    pub(crate) async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        self.initialize().await?;
        self.ensure_open()?;
        let request = JsonRpcRequest::new(self.ids.next_id(), method, params);
        debug!(provider = %self.name, request_id = request.id, method, "Sending MCP request");
        self.transport.send(request).await?.into_result()
    }
}

async fn handshake(
    name: String,
    transport: Arc<dyn McpTransport>,
    ids: Arc<RequestIdGenerator>,
) -> Result<InitializeResult, McpError> {
    let request = JsonRpcRequest::new(ids.next_id(), METHOD_INITIALIZE, Some(initialize_params()));
    let result = transport
        .send(request)
        .await
        .and_then(|response| response.into_result())
        .and_then(parse_initialize_result)
        .map_err(handshake_error)?;
    transport
        .notify(JsonRpcNotification::new(METHOD_NOTIFICATIONS_INITIALIZED, None))
        .await?;
    info!(
        provider = %name,
        server = %result.server_info.name,
        server_version = %result.server_info.version,
        protocol_version = %result.protocol_version,
        "MCP session initialized"
    );
    Ok(result)
}

/// Rejections of the handshake itself become session errors; connectivity
/// failures keep their variant.
fn handshake_error(err: McpError) -> McpError {
    match err {
        McpError::Transport(_) | McpError::Timeout { .. } | McpError::Closed => err,
        other => McpError::Session(format!("MCP initialization failed: {other}")),
    }
}
