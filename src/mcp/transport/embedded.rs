use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{McpTransport, McpTransportKind};
use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::METHOD_NOTIFICATIONS_CLOSE;

/// In-process MCP method dispatcher.
///
/// Returning [`McpError::Protocol`] produces a JSON-RPC error reply; any
/// other error is treated as a transport-level failure.
#[async_trait]
pub trait McpHandler: Send + Sync {
    async fn handle(&self, request: &JsonRpcRequest) -> Result<Value, McpError>;

    async fn handle_notification(&self, _notification: &JsonRpcNotification) {}
}

/// Direct dispatch into an [`McpHandler`]. No serialization takes place.
pub struct EmbeddedTransport {
    handler: Arc<dyn McpHandler>,
    closed: AtomicBool,
}

impl EmbeddedTransport {
    pub fn new(handler: Arc<dyn McpHandler>) -> Self {
        Self {
            handler,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl McpTransport for EmbeddedTransport {
    fn kind(&self) -> McpTransportKind {
        McpTransportKind::Embedded
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpError::Closed);
        }
        debug!(request_id = request.id, method = %request.method, "Dispatching embedded MCP request");
        match self.handler.handle(&request).await {
            Ok(result) => Ok(JsonRpcResponse::success(request.id, result)),
            Err(err @ McpError::Protocol { .. }) => Ok(JsonRpcResponse::from_error(request.id, err)),
            Err(err) => Err(err),
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpError::Closed);
        }
        self.handler.handle_notification(&notification).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.handler
            .handle_notification(&JsonRpcNotification::new(METHOD_NOTIFICATIONS_CLOSE, None))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl McpHandler for EchoHandler {
        async fn handle(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
            match request.method.as_str() {
                "echo" => Ok(request.params.clone().unwrap_or(Value::Null)),
                "broken" => Err(McpError::Transport("handler crashed".to_string())),
                other => Err(McpError::protocol(-32601, format!("Method not found: {other}"))),
            }
        }
    }

    #[tokio::test]
    async fn wraps_handler_results_in_envelopes() {
        let transport = EmbeddedTransport::new(Arc::new(EchoHandler));

        let ok = transport
            .send(JsonRpcRequest::new(1, "echo", Some(json!({"x": 1}))))
            .await
            .expect("send");
        assert_eq!(ok, JsonRpcResponse::success(1, json!({"x": 1})));

        let failure = transport
            .send(JsonRpcRequest::new(2, "missing", None))
            .await
            .expect("protocol errors are replies");
        assert_eq!(failure.id(), 2);
        assert!(!failure.is_success());

        let err = transport
            .send(JsonRpcRequest::new(3, "broken", None))
            .await
            .expect_err("transport error");
        assert!(matches!(err, McpError::Transport(_)));
    }

    #[tokio::test]
    async fn closed_transport_rejects_requests() {
        let transport = EmbeddedTransport::new(Arc::new(EchoHandler));
        transport.close().await.expect("close");
        transport.close().await.expect("second close is a no-op");
        let err = transport
            .send(JsonRpcRequest::new(1, "echo", None))
            .await
            .expect_err("closed");
        assert_eq!(err, McpError::Closed);
    }
}
