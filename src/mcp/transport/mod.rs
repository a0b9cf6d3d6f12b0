//! Shared MCP transport abstractions.
//!
//! A transport moves one JSON-RPC request to a server and hands back the
//! matching response. Embedded, stdio, and streamable HTTP transports all
//! present the same contract so the provider façade and its initialization
//! state machine stay transport-agnostic.

use std::fmt;

use async_trait::async_trait;

use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub mod embedded;
pub mod http;
pub mod sse;
pub mod stdio;
pub mod streamable_http;

pub use embedded::{EmbeddedTransport, McpHandler};
pub use stdio::{StdioLaunchConfig, StdioTransport};
pub use streamable_http::{StreamableHttpOptions, StreamableHttpTransport};

/// Supported MCP transport backends.
///
/// - [`McpTransportKind::Embedded`] dispatches in-process with no wire format.
/// - [`McpTransportKind::Stdio`] for locally spawned processes.
/// - [`McpTransportKind::StreamableHttp`] for remote servers over HTTP/SSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpTransportKind {
    Embedded,
    Stdio,
    StreamableHttp,
}

impl McpTransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            McpTransportKind::Embedded => "embedded",
            McpTransportKind::Stdio => "stdio",
            McpTransportKind::StreamableHttp => "streamable-http",
        }
    }
}

impl fmt::Display for McpTransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport contract used by the provider façade.
///
/// Methods take `&self`; implementations guard their own state so one
/// transport can serve concurrent callers.
#[async_trait]
pub trait McpTransport: Send + Sync {
    fn kind(&self) -> McpTransportKind;

    /// True once the transport can no longer carry requests, whether it was
    /// closed explicitly or its connection died.
    fn is_closed(&self) -> bool {
        false
    }

    /// Sends a request and returns the response carrying the same id.
    /// A JSON-RPC error reply is returned as [`JsonRpcResponse::Failure`],
    /// not as an `Err`.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError>;

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError>;

    /// Next server-initiated message that did not answer a pending request.
    async fn next_server_message(&self) -> Option<JsonRpcMessage> {
        None
    }

    /// Releases transport resources. Calling it again is a no-op.
    async fn close(&self) -> Result<(), McpError>;
}
