use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::mcp::{McpError, McpProvider};

/// One provider operation requested on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ListPrompts,
    GetPrompt {
        name: String,
        arguments: HashMap<String, String>,
    },
    ListTools,
    GetTool {
        name: String,
    },
    CallTool {
        name: String,
        arguments: Map<String, Value>,
    },
    ListResources,
    ListResourceTemplates,
    ReadResource {
        uri: String,
    },
    Capabilities,
}

#[derive(Debug)]
pub enum CliError {
    InvalidArgument(String),
    ToolNotFound(String),
    Mcp(McpError),
    Encode(serde_json::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgument(message) => write!(f, "Invalid argument: {message}"),
            CliError::ToolNotFound(name) => write!(f, "Tool '{name}' not found"),
            CliError::Mcp(err) => write!(f, "{err}"),
            CliError::Encode(err) => write!(f, "Failed to encode result: {err}"),
        }
    }
}

impl StdError for CliError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CliError::Mcp(err) => Some(err),
            CliError::Encode(err) => Some(err),
            CliError::InvalidArgument(_) | CliError::ToolNotFound(_) => None,
        }
    }
}

impl From<McpError> for CliError {
    fn from(err: McpError) -> Self {
        CliError::Mcp(err)
    }
}

fn split_pair(raw: &str) -> Result<(&str, &str), CliError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(CliError::InvalidArgument(format!(
            "expected KEY=VALUE, got '{raw}'"
        ))),
    }
}

pub fn parse_prompt_arguments(raw: &[String]) -> Result<HashMap<String, String>, CliError> {
    raw.iter()
        .map(|pair| split_pair(pair).map(|(key, value)| (key.to_string(), value.to_string())))
        .collect()
}

/// Merges `--json` and `--arg` values. `--arg` wins on conflicting keys.
pub fn parse_tool_arguments(
    json_object: Option<&str>,
    raw: &[String],
) -> Result<Map<String, Value>, CliError> {
    let mut arguments = match json_object {
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(object)) => object,
            Ok(_) => {
                return Err(CliError::InvalidArgument(
                    "--json must be a JSON object".to_string(),
                ))
            }
            Err(err) => return Err(CliError::InvalidArgument(format!("--json: {err}"))),
        },
        None => Map::new(),
    };

    for pair in raw {
        let (key, value) = split_pair(pair)?;
        let value = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        arguments.insert(key.to_string(), value);
    }
    Ok(arguments)
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, CliError> {
    serde_json::to_value(value).map_err(CliError::Encode)
}

pub async fn run_operation(provider: &McpProvider, operation: Operation) -> Result<Value, CliError> {
    match operation {
        Operation::ListPrompts => to_json(&provider.list_prompts().await?),
        Operation::GetPrompt { name, arguments } => {
            to_json(&provider.get_prompt(&name, &arguments).await?)
        }
        Operation::ListTools => to_json(&provider.list_tools().await?),
        Operation::GetTool { name } => match provider.get_tool(&name).await? {
            Some(tool) => to_json(&tool),
            None => Err(CliError::ToolNotFound(name)),
        },
        Operation::CallTool { name, arguments } => {
            to_json(&provider.call_tool(&name, arguments).await?)
        }
        Operation::ListResources => to_json(&provider.list_resources().await?),
        Operation::ListResourceTemplates => to_json(&provider.list_resource_templates().await?),
        Operation::ReadResource { uri } => to_json(&provider.read_resource(&uri).await?),
        Operation::Capabilities => {
            let result = provider.initialize().await?;
            Ok(json!({
                "provider": provider.name(),
                "transport": provider.transport_kind().as_str(),
                "protocolVersion": result.protocol_version,
                "serverInfo": to_json(&result.server_info)?,
                "capabilities": to_json(&result.capabilities)?,
                "instructions": result.instructions,
            }))
        }
    }
}
