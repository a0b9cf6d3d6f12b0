//! In-process MCP server.
//!
//! [`EmbeddedServer`] answers MCP methods from a [`PromptLibrary`], an
//! optional [`ToolLibrary`] and a fixed resource list. It backs the
//! `embedded` and `test` providers through [`EmbeddedTransport`] and can be
//! exposed to other processes with [`serve::serve_stdio`] or
//! [`http::serve_http`].
//!
//! [`EmbeddedTransport`]: crate::mcp::transport::EmbeddedTransport

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::core::config::{ConfigError, EmbeddedProviderConfig, TestProviderConfig};
use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{
    JsonRpcNotification, JsonRpcRequest, INVALID_PARAMS, METHOD_NOT_FOUND, RESOURCE_NOT_FOUND,
};
use crate::mcp::transport::McpHandler;
use crate::mcp::{
    METHOD_INITIALIZE, METHOD_NOTIFICATIONS_CLOSE, METHOD_NOTIFICATIONS_INITIALIZED,
    METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ,
    METHOD_RESOURCES_TEMPLATES_LIST, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, MCP_CLIENT_VERSION,
    MCP_PROTOCOL_VERSION,
};

pub mod http;
pub mod prompts;
pub mod resources;
pub mod serve;
pub mod tools;

pub use prompts::{PromptArgument, PromptLibrary, PromptTemplate};
pub use resources::{sample_resources, ResourceSpec};
pub use tools::{StarterToolLibrary, ToolLibrary, ToolOutcome, ToolSpec};

pub const EMBEDDED_SERVER_NAME: &str = "mcplink-embedded";
const METHOD_PING: &str = "ping";
/// Prompt category served by the test provider.
const TEST_PROMPT_CATEGORY: &str = "research";

pub struct EmbeddedServer {
    prompts: PromptLibrary,
    tools: Option<Arc<dyn ToolLibrary>>,
    resources: Vec<ResourceSpec>,
    closed: AtomicBool,
}

impl EmbeddedServer {
    pub fn new(prompts: PromptLibrary, tools: Option<Arc<dyn ToolLibrary>>) -> Self {
        Self {
            prompts,
            tools,
            resources: Vec::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_resources(mut self, resources: Vec<ResourceSpec>) -> Self {
        self.resources = resources;
        self
    }

    /// Server for an `embedded` provider: the configured prompt library (or
    /// the builtin one) plus the starter tools.
    pub fn from_embedded_config(config: &EmbeddedProviderConfig) -> Result<Self, ConfigError> {
        let prompts = match &config.prompt_library_path {
            Some(path) => PromptLibrary::load_from_path(path)?,
            None => PromptLibrary::builtin(),
        };
        Ok(Self::new(prompts, Some(Arc::new(StarterToolLibrary))))
    }

    /// Server for a `test` provider: research prompts, starter tools and
    /// sample resources, each of which can be switched off.
    pub fn from_test_config(config: &TestProviderConfig) -> Self {
        let prompts = if config.include_default_prompts {
            PromptLibrary::builtin().filter_category(TEST_PROMPT_CATEGORY)
        } else {
            PromptLibrary::new()
        };
        let tools: Option<Arc<dyn ToolLibrary>> = if config.include_default_tools {
            Some(Arc::new(StarterToolLibrary))
        } else {
            None
        };
        let resources = if config.include_default_resources {
            sample_resources()
        } else {
            Vec::new()
        };
        Self::new(prompts, tools).with_resources(resources)
    }

    pub fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .as_ref()
            .map(|tools| tools.list_tools())
            .unwrap_or_default()
    }

    /// Prompts are always advertised; tools and resources only when there
    /// are some.
    pub fn capabilities(&self) -> Value {
        let mut capabilities = json!({ "prompts": { "listChanged": false } });
        if !self.tool_specs().is_empty() {
            capabilities["tools"] = json!({ "listChanged": false });
        }
        if !self.resources.is_empty() {
            capabilities["resources"] = json!({ "subscribe": false, "listChanged": false });
        }
        capabilities
    }

    fn initialize(&self, request: &JsonRpcRequest) -> Value {
        let protocol_version = request
            .param_str("protocolVersion")
            .filter(|version| !version.trim().is_empty())
            .unwrap_or(MCP_PROTOCOL_VERSION);
        json!({
            "protocolVersion": protocol_version,
            "capabilities": self.capabilities(),
            "serverInfo": {
                "name": EMBEDDED_SERVER_NAME,
                "version": MCP_CLIENT_VERSION,
            }
        })
    }

    fn get_prompt(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
        let name = required_param(request, "name")?;
        let prompt = self.prompts.get(name).ok_or_else(|| {
            McpError::protocol(INVALID_PARAMS, format!("Prompt with name '{name}' not found"))
        })?;
        let arguments = string_arguments(request);
        let mut result = json!({
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": prompt.fill(&arguments) }
            }]
        });
        if let Some(description) = prompt.display_description() {
            result["description"] = json!(description);
        }
        Ok(result)
    }

    async fn call_tool(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
        let name = required_param(request, "name")?;
        let outcome = match &self.tools {
            Some(tools) => {
                let arguments = request
                    .params
                    .as_ref()
                    .and_then(|params| params.get("arguments"))
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                tools.call_tool(name, &arguments).await
            }
            None => ToolOutcome::Error("Tool library is disabled".to_string()),
        };
        Ok(outcome.to_mcp_value())
    }

    fn read_resource(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
        let uri = required_param(request, "uri")?;
        self.resources
            .iter()
            .find(|resource| resource.uri == uri)
            .map(ResourceSpec::read_value)
            .ok_or_else(|| {
                McpError::protocol(
                    RESOURCE_NOT_FOUND,
                    format!("Resource with URI '{uri}' not found"),
                )
            })
    }
}

fn required_param<'a>(request: &'a JsonRpcRequest, name: &str) -> Result<&'a str, McpError> {
    request
        .param_str(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            McpError::protocol(
                INVALID_PARAMS,
                format!("Invalid params: '{name}' is required"),
            )
        })
}

/// Prompt arguments as strings. Non-string values use their JSON text.
fn string_arguments(request: &JsonRpcRequest) -> HashMap<String, String> {
    let Some(Value::Object(arguments)) = request
        .params
        .as_ref()
        .and_then(|params| params.get("arguments"))
    else {
        return HashMap::new();
    };
    arguments
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

fn list_result(field: &str, items: Vec<Value>) -> Value {
    let mut result = Map::new();
    result.insert(field.to_string(), Value::Array(items));
    Value::Object(result)
}

#[async_trait]
impl McpHandler for EmbeddedServer {
    async fn handle(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        debug!(request_id = request.id, method = %request.method, "Embedded MCP server handling request");
        match request.method.as_str() {
            METHOD_INITIALIZE => Ok(self.initialize(request)),
            METHOD_PING => Ok(json!({})),
            METHOD_PROMPTS_LIST => Ok(list_result(
                "prompts",
                self.prompts.list().map(PromptTemplate::to_mcp_value).collect(),
            )),
            METHOD_PROMPTS_GET => self.get_prompt(request),
            METHOD_TOOLS_LIST => Ok(list_result(
                "tools",
                self.tool_specs().iter().map(ToolSpec::to_mcp_value).collect(),
            )),
            METHOD_TOOLS_CALL => self.call_tool(request).await,
            METHOD_RESOURCES_LIST => Ok(list_result(
                "resources",
                self.resources.iter().map(ResourceSpec::to_mcp_value).collect(),
            )),
            METHOD_RESOURCES_TEMPLATES_LIST => Ok(list_result("resourceTemplates", Vec::new())),
            METHOD_RESOURCES_READ => self.read_resource(request),
            other => Err(McpError::protocol(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }

    async fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            METHOD_NOTIFICATIONS_CLOSE => {
                if !self.closed.swap(true, Ordering::AcqRel) {
                    info!("Embedded MCP server closed");
                }
            }
            METHOD_NOTIFICATIONS_INITIALIZED => {
                debug!("Embedded MCP server initialized");
            }
            other => {
                debug!(method = other, "Ignoring MCP notification");
            }
        }
    }
}
