use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::mcp::error::McpError;

pub const MCP_JSON_CONTENT_TYPE: &str = "application/json";
pub const MCP_JSON_AND_SSE_ACCEPT: &str = "application/json, text/event-stream";
pub const MCP_EVENT_STREAM_ACCEPT: &str = "text/event-stream";
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
pub const MCP_SESSION_ID_HEADER: &str = "Mcp-Session-Id";

const MCP_ENDPOINT_PATH: &str = "/mcp";
const MCP_HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS: u64 = 90;
const MCP_HTTP_POOL_MAX_IDLE_PER_HOST: usize = 8;

/// Builds the shared client. No overall request timeout is set here because
/// the SSE GET is long-lived; POSTs carry their own timeout.
pub fn build_mcp_http_client() -> Result<reqwest::Client, McpError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(MCP_HTTP_CONNECT_TIMEOUT_SECONDS))
        .pool_idle_timeout(Duration::from_secs(MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS))
        .pool_max_idle_per_host(MCP_HTTP_POOL_MAX_IDLE_PER_HOST)
        .build()
        .map_err(|err| McpError::Transport(format!("Failed to build MCP HTTP client: {err}")))
}

/// Resolves the MCP endpoint for a configured base URL. Both
/// `https://host/api` and `https://host/api/mcp/` map to `https://host/api/mcp`.
pub fn mcp_endpoint(base_url: &str) -> Result<reqwest::Url, McpError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let base = trimmed.strip_suffix(MCP_ENDPOINT_PATH).unwrap_or(trimmed);
    let endpoint = format!("{}{MCP_ENDPOINT_PATH}", base.trim_end_matches('/'));
    reqwest::Url::parse(&endpoint)
        .map_err(|err| McpError::Transport(format!("Invalid MCP server URL {base_url}: {err}")))
}

pub fn apply_streamable_http_client_post_headers(
    request: reqwest::RequestBuilder,
) -> reqwest::RequestBuilder {
    request
        .header("Content-Type", MCP_JSON_CONTENT_TYPE)
        .header("Accept", MCP_JSON_AND_SSE_ACCEPT)
}

pub fn apply_streamable_http_protocol_version_header(
    request: reqwest::RequestBuilder,
    protocol_version: Option<&str>,
) -> reqwest::RequestBuilder {
    match protocol_version {
        Some(protocol_version) if !protocol_version.trim().is_empty() => {
            request.header(MCP_PROTOCOL_VERSION_HEADER, protocol_version)
        }
        _ => request,
    }
}

pub fn apply_session_id_header(
    request: reqwest::RequestBuilder,
    session_id: Option<&str>,
) -> reqwest::RequestBuilder {
    match session_id {
        Some(session_id) => request.header(MCP_SESSION_ID_HEADER, session_id),
        None => request,
    }
}

pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

pub fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
