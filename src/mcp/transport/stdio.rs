//! Child-process transport: one JSON-RPC message per line on stdin/stdout.
//!
//! Requests are strictly serialized; the process lock is held for the whole
//! write-then-read cycle. Reads carry no timeout, so a child that never
//! answers blocks the caller until it exits or the transport is closed.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{McpTransport, McpTransportKind};
use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::METHOD_NOTIFICATIONS_CLOSE;

const STDIO_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const STDIO_EXIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StdioLaunchConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Merged over the inherited environment.
    pub env: HashMap<String, String>,
}

struct StdioProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

pub struct StdioTransport {
    server_name: String,
    launch: StdioLaunchConfig,
    process: Mutex<Option<StdioProcess>>,
    closed: AtomicBool,
}

impl StdioTransport {
    /// The child is launched lazily on the first request.
    pub fn new(server_name: impl Into<String>, launch: StdioLaunchConfig) -> Self {
        Self {
            server_name: server_name.into(),
            launch,
            process: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn spawn(&self) -> Result<StdioProcess, McpError> {
        debug!(
            server = %self.server_name,
            command = %self.launch.command,
            args = ?self.launch.args,
            "Starting MCP stdio server"
        );
        let mut cmd = Command::new(&self.launch.command);
        cmd.args(&self.launch.args)
            .envs(&self.launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            McpError::Transport(format!(
                "Failed to launch MCP server '{}': {err}",
                self.launch.command
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("Unable to retrieve stdin.".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("Unable to retrieve stdout.".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_drain(self.server_name.clone(), stderr);
        }

        info!(server = %self.server_name, pid = ?child.id(), "MCP stdio server started");
        Ok(StdioProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    fn ensure_open(&self) -> Result<(), McpError> {
        if self.closed.load(Ordering::Acquire) {
            Err(McpError::Closed)
        } else {
            Ok(())
        }
    }

    /// Tears down a process that can no longer be used. The transport stays
    /// closed afterwards, which the owning provider reports.
    async fn abandon(&self, process: &mut Option<StdioProcess>) {
        self.closed.store(true, Ordering::Release);
        if let Some(mut process) = process.take() {
            let _ = process.child.start_kill();
            let _ = process.child.wait().await;
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, payload: &str) -> Result<(), McpError> {
    let write = async {
        stdin.write_all(payload.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    };
    tokio::time::timeout(STDIO_WRITE_TIMEOUT, write)
        .await
        .map_err(|_| McpError::Transport("Timed out writing MCP stdio message.".to_string()))?
        .map_err(|err| McpError::Transport(format!("Failed to write MCP stdio message: {err}")))
}

fn spawn_stderr_drain(server_name: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            debug!(server = %server_name, line = %line, "MCP stdio server stderr");
        }
    });
}

#[async_trait]
impl McpTransport for StdioTransport {
    fn kind(&self) -> McpTransportKind {
        McpTransportKind::Stdio
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        self.ensure_open()?;
        let payload = request.encode()?;
        let mut guard = self.process.lock().await;
        self.ensure_open()?;
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let Some(process) = guard.as_mut() else {
            return Err(McpError::Closed);
        };

        debug!(
            server = %self.server_name,
            request_id = request.id,
            method = %request.method,
            "Writing MCP stdio request"
        );
        if let Err(err) = write_line(&mut process.stdin, &payload).await {
            self.abandon(&mut guard).await;
            return Err(err);
        }

        loop {
            let next = process.stdout.next_line().await;
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    warn!(server = %self.server_name, request_id = request.id, "MCP stdio server closed stdout");
                    self.abandon(&mut guard).await;
                    return Err(McpError::Transport(format!(
                        "MCP stdio server '{}' exited before responding.",
                        self.server_name
                    )));
                }
                Err(err) => {
                    self.abandon(&mut guard).await;
                    return Err(McpError::Transport(format!(
                        "Failed to read from MCP stdio server: {err}"
                    )));
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match JsonRpcMessage::decode_str(line)? {
                JsonRpcMessage::Response(response) if response.id() == request.id => {
                    debug!(server = %self.server_name, request_id = request.id, "Received MCP stdio response");
                    return Ok(response);
                }
                JsonRpcMessage::Response(response) => {
                    warn!(
                        server = %self.server_name,
                        expected = request.id,
                        received = response.id(),
                        "Skipping MCP stdio response for another request"
                    );
                }
                JsonRpcMessage::Request(server_request) => {
                    debug!(
                        server = %self.server_name,
                        method = %server_request.method,
                        "Ignoring server-initiated MCP stdio request"
                    );
                }
                JsonRpcMessage::Notification(notification) => {
                    debug!(
                        server = %self.server_name,
                        method = %notification.method,
                        "Ignoring MCP stdio notification"
                    );
                }
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        self.ensure_open()?;
        let payload = notification.encode()?;
        let mut guard = self.process.lock().await;
        self.ensure_open()?;
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let Some(process) = guard.as_mut() else {
            return Err(McpError::Closed);
        };
        debug!(server = %self.server_name, method = %notification.method, "Writing MCP stdio notification");
        if let Err(err) = write_line(&mut process.stdin, &payload).await {
            self.abandon(&mut guard).await;
            return Err(err);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(mut process) = self.process.lock().await.take() else {
            return Ok(());
        };

        let delivered = match JsonRpcNotification::new(METHOD_NOTIFICATIONS_CLOSE, None).encode() {
            Ok(payload) => write_line(&mut process.stdin, &payload).await,
            Err(err) => Err(err),
        };
        if let Err(err) = delivered {
            debug!(server = %self.server_name, error = %err, "MCP stdio close notification not delivered");
        }
        drop(process.stdin);

        match tokio::time::timeout(STDIO_EXIT_GRACE, process.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = process.child.start_kill();
                let _ = process.child.wait().await;
            }
        }
        info!(server = %self.server_name, "MCP stdio server stopped");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell(script: &str) -> StdioLaunchConfig {
        StdioLaunchConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_request_through_a_child_process() {
        let transport = StdioTransport::new(
            "mock",
            shell(r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}'; cat >/dev/null"#),
        );
        let response = transport
            .send(JsonRpcRequest::new(1, "tools/list", None))
            .await
            .expect("response");
        assert_eq!(response, JsonRpcResponse::success(1, json!({"tools": []})));
        transport.close().await.expect("close");
    }

    #[tokio::test]
    async fn skips_blank_lines_notifications_and_stale_ids() {
        let script = r#"read line
echo ''
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
echo '{"jsonrpc":"2.0","id":41,"result":{}}'
echo '{"jsonrpc":"2.0","id":42,"result":{"ok":true}}'
cat >/dev/null"#;
        let transport = StdioTransport::new("mock", shell(script));
        let response = transport
            .send(JsonRpcRequest::new(42, "ping", None))
            .await
            .expect("response");
        assert_eq!(response, JsonRpcResponse::success(42, json!({"ok": true})));
    }

    #[tokio::test]
    async fn malformed_line_is_a_parse_error_and_keeps_the_process() {
        let script = r#"read line; echo 'not json'
read line; echo '{"jsonrpc":"2.0","id":2,"result":{}}'
cat >/dev/null"#;
        let transport = StdioTransport::new("mock", shell(script));
        let err = transport
            .send(JsonRpcRequest::new(1, "ping", None))
            .await
            .expect_err("malformed");
        assert!(matches!(err, McpError::Parse(_)));

        let response = transport
            .send(JsonRpcRequest::new(2, "ping", None))
            .await
            .expect("process still usable");
        assert_eq!(response.id(), 2);
    }

    #[tokio::test]
    async fn exit_before_reply_is_a_transport_error_then_closed() {
        let transport = StdioTransport::new("mock", shell("read line; exit 0"));
        let err = transport
            .send(JsonRpcRequest::new(1, "ping", None))
            .await
            .expect_err("exited");
        assert!(matches!(err, McpError::Transport(_)));

        assert!(transport.is_closed());

        let err = transport
            .send(JsonRpcRequest::new(2, "ping", None))
            .await
            .expect_err("closed");
        assert_eq!(err, McpError::Closed);
    }

    #[tokio::test]
    async fn launch_failure_surfaces_immediately() {
        let transport = StdioTransport::new(
            "missing",
            StdioLaunchConfig {
                command: "/nonexistent/mcp-server-binary".to_string(),
                ..Default::default()
            },
        );
        let err = transport
            .send(JsonRpcRequest::new(1, "initialize", None))
            .await
            .expect_err("spawn failure");
        assert!(matches!(err, McpError::Transport(_)));
    }

    #[tokio::test]
    async fn environment_is_passed_to_the_child() {
        let mut launch = shell(
            r#"read line; printf '{"jsonrpc":"2.0","id":1,"result":{"value":"%s"}}\n' "$MCPLINK_TEST_VALUE"; cat >/dev/null"#,
        );
        launch
            .env
            .insert("MCPLINK_TEST_VALUE".to_string(), "from-env".to_string());
        let transport = StdioTransport::new("env", launch);
        let response = transport
            .send(JsonRpcRequest::new(1, "ping", None))
            .await
            .expect("response");
        assert_eq!(
            response,
            JsonRpcResponse::success(1, json!({"value": "from-env"}))
        );
    }
}
