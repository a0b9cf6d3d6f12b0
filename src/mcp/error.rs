use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use crate::mcp::jsonrpc::RequestId;

/// Failures surfaced by transports, the pending-request table, and the
/// provider façade.
///
/// The type is `Clone` because a single handshake failure is delivered to
/// every caller that was waiting on it.
#[derive(Debug, Clone, PartialEq)]
pub enum McpError {
    /// The payload was not valid JSON or not a JSON-RPC 2.0 message.
    Parse(String),
    /// Well-formed JSON that is not a usable reply: no `result`/`error`, a
    /// `null` id, or a result that does not match the expected schema.
    InvalidResponse(String),
    /// A JSON-RPC error object returned by the remote side.
    Protocol {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },
    /// Connection, HTTP status, or child-process failure.
    Transport(String),
    /// The request was not answered before its deadline. It may still be
    /// outstanding on the server.
    Timeout { id: RequestId, after: Duration },
    /// The initialization handshake failed or the session is unusable.
    Session(String),
    /// The provider or transport has been closed.
    Closed,
}

impl McpError {
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        McpError::Protocol {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, McpError::Protocol { .. })
    }

    pub fn protocol_code(&self) -> Option<i64> {
        match self {
            McpError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Transport faults and timeouts may succeed on a later attempt; parse,
    /// protocol, and closed errors will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            McpError::Transport(_) | McpError::Timeout { .. } | McpError::Session(_)
        )
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McpError::Parse(detail) => write!(f, "MCP parse error: {detail}"),
            McpError::InvalidResponse(detail) => {
                write!(f, "Invalid MCP protocol response: {detail}")
            }
            McpError::Protocol {
                code,
                message,
                data,
            } => {
                write!(f, "MCP error {code}: {message}")?;
                if let Some(data) = data {
                    write!(f, " ({data})")?;
                }
                Ok(())
            }
            McpError::Transport(detail) => write!(f, "MCP transport error: {detail}"),
            McpError::Timeout { id, after } => write!(
                f,
                "MCP request {id} timed out after {}ms",
                after.as_millis()
            ),
            McpError::Session(detail) => write!(f, "MCP session error: {detail}"),
            McpError::Closed => write!(f, "MCP provider is closed."),
        }
    }
}

impl StdError for McpError {}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display_includes_code_and_data() {
        let err = McpError::Protocol {
            code: -32602,
            message: "Invalid params".to_string(),
            data: Some(serde_json::json!({"field": "name"})),
        };
        assert_eq!(
            err.to_string(),
            "MCP error -32602: Invalid params ({\"field\":\"name\"})"
        );
        assert!(err.is_protocol());
        assert!(!err.is_retryable());
    }

    #[test]
    fn timeouts_are_retryable_but_closed_is_not() {
        let timeout = McpError::Timeout {
            id: 7,
            after: Duration::from_millis(250),
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.to_string(), "MCP request 7 timed out after 250ms");
        assert!(!McpError::Closed.is_retryable());
    }
}
