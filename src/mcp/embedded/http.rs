//! Serves an [`McpHandler`] over streamable HTTP.
//!
//! `POST /mcp` carries one JSON-RPC message; requests are answered with a
//! JSON body, notifications with `202 Accepted`. No push channel is offered,
//! so `GET /mcp` is refused with `405` and clients keep to POST replies.
//! A successful `initialize` is handed a fresh `Mcp-Session-Id`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::serve::{dispatch, Dispatch};
use crate::mcp::error::McpError;
use crate::mcp::transport::http::MCP_JSON_CONTENT_TYPE;
use crate::mcp::transport::McpHandler;

pub const MCP_HTTP_PATH: &str = "/mcp";
pub const MCP_HEALTH_PATH: &str = "/health";

const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

struct HttpServeState {
    handler: Arc<dyn McpHandler>,
    shutdown: CancellationToken,
    sessions: AtomicU64,
}

impl HttpServeState {
    fn next_session_id(&self) -> String {
        let serial = self.sessions.fetch_add(1, Ordering::Relaxed);
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        format!("{:x}-{started:x}-{serial}", std::process::id())
    }
}

/// Routes for one handler. Cancelling `shutdown` is how a received
/// `notifications/close` reaches the server loop.
pub fn router(handler: Arc<dyn McpHandler>, shutdown: CancellationToken) -> Router {
    let state = Arc::new(HttpServeState {
        handler,
        shutdown,
        sessions: AtomicU64::new(1),
    });
    Router::new()
        .route(MCP_HTTP_PATH, post(handle_post).get(push_unavailable))
        .route(MCP_HEALTH_PATH, get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `handler` on `listener` until `shutdown` is cancelled or a client
/// sends `notifications/close`. In-flight replies are finished first.
pub async fn serve_http(
    handler: Arc<dyn McpHandler>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<(), McpError> {
    let addr = listener
        .local_addr()
        .map_err(|err| McpError::Transport(format!("MCP HTTP listener has no address: {err}")))?;
    info!(%addr, path = MCP_HTTP_PATH, "Serving MCP over HTTP");

    let app = router(handler, shutdown.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|err| McpError::Transport(format!("MCP HTTP server failed: {err}")))?;
    info!(%addr, "MCP HTTP server stopped");
    Ok(())
}

async fn handle_post(State(state): State<Arc<HttpServeState>>, body: String) -> Response {
    let outcome = match dispatch(state.handler.as_ref(), &body).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(error = %err, "Failed to answer MCP request");
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    match outcome {
        Dispatch::Reply { body, initialized } => {
            let mut response =
                ([(header::CONTENT_TYPE, MCP_JSON_CONTENT_TYPE)], body).into_response();
            if initialized {
                let session_id = state.next_session_id();
                debug!(session_id = %session_id, "Opened MCP HTTP session");
                if let Ok(value) = HeaderValue::from_str(&session_id) {
                    response.headers_mut().insert(SESSION_ID_HEADER, value);
                }
            }
            response
        }
        Dispatch::Accepted => StatusCode::ACCEPTED.into_response(),
        Dispatch::Close => {
            info!("Received close notification, stopping MCP HTTP server");
            state.shutdown.cancel();
            StatusCode::ACCEPTED.into_response()
        }
    }
}

async fn push_unavailable() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        "This MCP server does not offer an SSE stream",
    )
        .into_response()
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TestProviderConfig;
    use crate::mcp::embedded::EmbeddedServer;
    use crate::utils::test_utils::clear_proxy_env;
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn start() -> (String, CancellationToken, tokio::task::JoinHandle<Result<(), McpError>>) {
        clear_proxy_env();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base_url = format!("http://{}", listener.local_addr().expect("addr"));
        let server = EmbeddedServer::from_test_config(&TestProviderConfig::default());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(serve_http(Arc::new(server), listener, shutdown.clone()));
        (base_url, shutdown, task)
    }

    async fn post(client: &reqwest::Client, base_url: &str, body: &str) -> reqwest::Response {
        client
            .post(format!("{base_url}{MCP_HTTP_PATH}"))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("POST should reach the server")
    }

    #[tokio::test]
    async fn initialize_opens_a_session_and_requests_get_json_replies() {
        let (base_url, shutdown, task) = start().await;
        let client = reqwest::Client::new();

        let response = post(
            &client,
            &base_url,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}"#,
        )
        .await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.headers().get("mcp-session-id").is_some());
        let body: Value = response.json().await.expect("json body");
        assert_eq!(body["result"]["protocolVersion"], "2025-06-18");

        let response = post(&client, &base_url, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

        let response = post(&client, &base_url, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await;
        assert!(response.headers().get("mcp-session-id").is_none());
        let body: Value = response.json().await.expect("json body");
        assert_eq!(body["id"], 2);
        assert!(body["result"]["tools"].is_array());

        shutdown.cancel();
        task.await.expect("join").expect("server should stop cleanly");
    }

    #[tokio::test]
    async fn bad_input_gets_error_replies_and_get_is_refused() {
        let (base_url, shutdown, task) = start().await;
        let client = reqwest::Client::new();

        let body: Value = post(&client, &base_url, "").await.json().await.expect("json body");
        assert_eq!(body["error"]["code"], json!(-32700));
        assert!(body["id"].is_null());

        let body: Value = post(&client, &base_url, r#"{"jsonrpc":"2.0","id":4}"#)
            .await
            .json()
            .await
            .expect("json body");
        assert_eq!(body["error"]["code"], json!(-32600));

        let refused = client
            .get(format!("{base_url}{MCP_HTTP_PATH}"))
            .header("Accept", "text/event-stream")
            .send()
            .await
            .expect("GET should reach the server");
        assert_eq!(refused.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

        let health = client
            .get(format!("{base_url}{MCP_HEALTH_PATH}"))
            .send()
            .await
            .expect("health check");
        assert_eq!(health.text().await.expect("health body"), "OK");

        shutdown.cancel();
        task.await.expect("join").expect("server should stop cleanly");
    }

    #[tokio::test]
    async fn close_notification_stops_the_server() {
        let (base_url, _shutdown, task) = start().await;
        let client = reqwest::Client::new();

        let response = post(&client, &base_url, r#"{"jsonrpc":"2.0","method":"notifications/close"}"#).await;
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("server should stop after close")
            .expect("join")
            .expect("server should stop cleanly");
    }
}
