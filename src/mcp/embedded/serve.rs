//! Serves an [`McpHandler`] over newline-delimited JSON-RPC.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{
    JsonRpcAnonymousError, JsonRpcMessage, JsonRpcResponse, INVALID_REQUEST, PARSE_ERROR,
};
use crate::mcp::transport::McpHandler;
use crate::mcp::{METHOD_INITIALIZE, METHOD_NOTIFICATIONS_CLOSE};

/// Result of handing one inbound message to a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Encoded reply. `initialized` is set for a successful `initialize`.
    Reply { body: String, initialized: bool },
    /// Notification or stray response; nothing to send back.
    Accepted,
    /// `notifications/close` arrived; the caller should stop serving.
    Close,
}

/// Decodes `payload`, runs it through `handler` and encodes the reply.
/// Undecodable input is answered with an id-less error reply.
pub async fn dispatch(handler: &dyn McpHandler, payload: &str) -> Result<Dispatch, McpError> {
    match JsonRpcMessage::decode_str(payload.trim()) {
        Ok(JsonRpcMessage::Request(request)) => {
            let response = match handler.handle(&request).await {
                Ok(result) => JsonRpcResponse::success(request.id, result),
                Err(err) => JsonRpcResponse::from_error(request.id, err),
            };
            Ok(Dispatch::Reply {
                initialized: request.method == METHOD_INITIALIZE && response.is_success(),
                body: response.encode()?,
            })
        }
        Ok(JsonRpcMessage::Notification(notification)) => {
            handler.handle_notification(&notification).await;
            if notification.method == METHOD_NOTIFICATIONS_CLOSE {
                Ok(Dispatch::Close)
            } else {
                Ok(Dispatch::Accepted)
            }
        }
        Ok(JsonRpcMessage::Response(response)) => {
            debug!(request_id = response.id(), "Ignoring response sent to MCP server");
            Ok(Dispatch::Accepted)
        }
        Err(McpError::InvalidResponse(message)) => {
            warn!(error = %message, "Rejecting invalid MCP request");
            anonymous_error(INVALID_REQUEST, format!("Invalid request: {message}"))
        }
        Err(err) => {
            warn!(error = %err, "Rejecting unparseable MCP input");
            anonymous_error(PARSE_ERROR, err.to_string())
        }
    }
}

fn anonymous_error(code: i64, message: String) -> Result<Dispatch, McpError> {
    Ok(Dispatch::Reply {
        body: JsonRpcAnonymousError::new(code, message).encode()?,
        initialized: false,
    })
}

/// Reads one message per line from `reader` and writes one reply per
/// request to `writer`. Returns on end of input or after
/// `notifications/close`.
pub async fn serve_lines<R, W>(
    handler: &dyn McpHandler,
    reader: R,
    mut writer: W,
) -> Result<(), McpError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|err| McpError::Transport(format!("Failed to read MCP input: {err}")))?;
        let Some(line) = line else {
            debug!("MCP input closed");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        match dispatch(handler, &line).await? {
            Dispatch::Reply { body, .. } => write_line(&mut writer, &body).await?,
            Dispatch::Accepted => {}
            Dispatch::Close => {
                info!("Received close notification, stopping MCP server");
                return Ok(());
            }
        }
    }
}

/// Serves `handler` on this process's stdin/stdout.
pub async fn serve_stdio(handler: &dyn McpHandler) -> Result<(), McpError> {
    info!("Serving MCP over stdio");
    serve_lines(
        handler,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, body: &str) -> Result<(), McpError> {
    let write = async {
        writer.write_all(body.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    };
    write
        .await
        .map_err(|err| McpError::Transport(format!("Failed to write MCP output: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TestProviderConfig;
    use crate::mcp::embedded::EmbeddedServer;
    use serde_json::Value;

    async fn serve_input(input: &str) -> Vec<Value> {
        let server = EmbeddedServer::from_test_config(&TestProviderConfig::default());
        let mut output = Vec::new();
        serve_lines(&server, input.as_bytes(), &mut output)
            .await
            .expect("serve");
        String::from_utf8(output)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[tokio::test]
    async fn answers_requests_in_order() {
        let replies = serve_input(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        ))
        .await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[0]["result"]["protocolVersion"], "2025-06-18");
        assert_eq!(replies[1]["id"], 2);
        assert!(replies[1]["result"]["tools"].as_array().is_some_and(|tools| !tools.is_empty()));
    }

    #[tokio::test]
    async fn malformed_lines_get_parse_errors() {
        let replies = serve_input("not json\n{\"jsonrpc\":\"2.0\",\"id\":5}\n").await;

        assert_eq!(replies.len(), 2);
        assert!(replies[0]["id"].is_null());
        assert_eq!(replies[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(replies[1]["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn close_notification_stops_the_loop() {
        let replies = serve_input(concat!(
            r#"{"jsonrpc":"2.0","method":"notifications/close"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":9,"method":"prompts/list"}"#,
            "\n",
        ))
        .await;
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn dispatch_flags_successful_initialize() {
        let server = EmbeddedServer::from_test_config(&TestProviderConfig::default());

        let outcome = dispatch(&server, r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
            .await
            .expect("dispatch");
        assert!(matches!(outcome, Dispatch::Reply { initialized: true, .. }));

        let outcome = dispatch(&server, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .expect("dispatch");
        assert!(matches!(outcome, Dispatch::Reply { initialized: false, .. }));

        let outcome = dispatch(&server, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .expect("dispatch");
        assert_eq!(outcome, Dispatch::Accepted);
    }

    #[tokio::test]
    async fn unknown_methods_are_reported() {
        let replies =
            serve_input("{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"sampling/createMessage\"}\n")
                .await;
        assert_eq!(replies[0]["id"], 3);
        assert_eq!(replies[0]["error"]["code"], -32601);
    }
}
