use std::collections::HashMap;

use rust_mcp_schema::{
    CallToolResult, GetPromptResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, Prompt, ReadResourceResult, Resource, ResourceTemplate,
    Tool,
};
use serde_json::{json, Map, Value};
use tracing::warn;

use super::protocol::{parse_result, Paginated};
use super::{McpProvider, MCP_MAX_LIST_PAGES};
use crate::mcp::error::McpError;
use crate::mcp::{
    METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ,
    METHOD_RESOURCES_TEMPLATES_LIST, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
};

impl McpProvider {
    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, McpError> {
        self.list_all::<ListPromptsResult>(METHOD_PROMPTS_LIST).await
    }

    /// Fills a prompt template with `arguments`.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<GetPromptResult, McpError> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.request(METHOD_PROMPTS_GET, Some(params)).await?;
        parse_result(METHOD_PROMPTS_GET, result)
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        self.list_all::<ListToolsResult>(METHOD_TOOLS_LIST).await
    }

    /// Looks a tool up by name in the listing. There is no dedicated wire
    /// method for this.
    pub async fn get_tool(&self, name: &str) -> Result<Option<Tool>, McpError> {
        Ok(self
            .list_tools()
            .await?
            .into_iter()
            .find(|tool| tool.name == name))
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.request(METHOD_TOOLS_CALL, Some(params)).await?;
        parse_result(METHOD_TOOLS_CALL, result)
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>, McpError> {
        self.list_all::<ListResourcesResult>(METHOD_RESOURCES_LIST)
            .await
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, McpError> {
        self.list_all::<ListResourceTemplatesResult>(METHOD_RESOURCES_TEMPLATES_LIST)
            .await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let result = self
            .request(METHOD_RESOURCES_READ, Some(json!({ "uri": uri })))
            .await?;
        parse_result(METHOD_RESOURCES_READ, result)
    }

    async fn list_all<R: Paginated>(&self, method: &str) -> Result<Vec<R::Item>, McpError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=MCP_MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|cursor| json!({ "cursor": cursor }));
            let result = self.request(method, params).await?;
            let (page_items, next_cursor) = parse_result::<R>(method, result)?.into_page();
            items.extend(page_items);

            match next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    if page == MCP_MAX_LIST_PAGES {
                        warn!(provider = %self.name(), method, pages = page, "Stopping MCP pagination at page limit");
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(items)
    }
}
