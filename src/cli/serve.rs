use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::mcp::embedded::http::serve_http;
use crate::mcp::embedded::serve::serve_stdio;
use crate::mcp::McpProviderRegistry;

/// Runs the named in-process provider as an MCP server. Over stdio it stops
/// when stdin closes; either way a `notifications/close` from the client
/// ends it, and over HTTP so does Ctrl-C.
pub async fn serve_provider(
    registry: &McpProviderRegistry,
    name: &str,
    http: Option<SocketAddr>,
) -> Result<(), Box<dyn Error>> {
    let server = registry.embedded_server(name)?;
    let Some(addr) = http else {
        info!(provider = name, prompts = server.prompts().len(), "Starting stdio MCP server");
        serve_stdio(&server).await?;
        return Ok(());
    };

    let listener = TcpListener::bind(addr).await?;
    info!(provider = name, prompts = server.prompts().len(), %addr, "Starting HTTP MCP server");
    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    serve_http(Arc::new(server), listener, shutdown).await?;
    Ok(())
}
