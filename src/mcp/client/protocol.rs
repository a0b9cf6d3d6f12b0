use rust_mcp_schema::{
    InitializeResult, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult,
    ListToolsResult, Prompt, Resource, ResourceTemplate, Tool,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::mcp::error::McpError;
use crate::mcp::{MCP_CLIENT_NAME, MCP_CLIENT_VERSION, MCP_PROTOCOL_VERSION};

pub(crate) fn initialize_params() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": MCP_CLIENT_NAME,
            "version": MCP_CLIENT_VERSION,
        }
    })
}

pub(crate) fn parse_initialize_result(value: Value) -> Result<InitializeResult, McpError> {
    let result = parse_result::<InitializeResult>("initialize", value)?;
    if result.protocol_version.trim().is_empty() {
        return Err(McpError::InvalidResponse(
            "initialize result has a blank protocolVersion".to_string(),
        ));
    }
    Ok(result)
}

pub(crate) fn parse_result<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, McpError> {
    serde_json::from_value::<T>(value).map_err(|err| {
        McpError::InvalidResponse(format!("Unexpected {method} result: {err}"))
    })
}

/// Cursor-paginated list results.
pub(crate) trait Paginated: DeserializeOwned {
    type Item;

    fn into_page(self) -> (Vec<Self::Item>, Option<String>);
}

impl Paginated for ListPromptsResult {
    type Item = Prompt;

    fn into_page(self) -> (Vec<Prompt>, Option<String>) {
        (self.prompts, self.next_cursor)
    }
}

impl Paginated for ListToolsResult {
    type Item = Tool;

    fn into_page(self) -> (Vec<Tool>, Option<String>) {
        (self.tools, self.next_cursor)
    }
}

impl Paginated for ListResourcesResult {
    type Item = Resource;

    fn into_page(self) -> (Vec<Resource>, Option<String>) {
        (self.resources, self.next_cursor)
    }
}

impl Paginated for ListResourceTemplatesResult {
    type Item = ResourceTemplate;

    fn into_page(self) -> (Vec<ResourceTemplate>, Option<String>) {
        (self.resource_templates, self.next_cursor)
    }
}
