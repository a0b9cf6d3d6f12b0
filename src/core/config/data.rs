use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Registry file contents: named provider configurations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpRegistryConfig {
    #[serde(default)]
    pub servers: BTreeMap<String, McpProviderConfig>,
}

/// One provider entry.
///
/// Entries carry an optional `type` tag. Without it the type is inferred:
/// a `command` field means stdio, a `url` field means HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", try_from = "RawProviderConfig")]
pub enum McpProviderConfig {
    Embedded(EmbeddedProviderConfig),
    Stdio(StdioProviderConfig),
    Http(HttpProviderConfig),
    Test(TestProviderConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_library_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StdioProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub include_default_prompts: bool,
    pub include_default_tools: bool,
    pub include_default_resources: bool,
}

impl Default for TestProviderConfig {
    fn default() -> Self {
        Self {
            description: None,
            include_default_prompts: true,
            include_default_tools: true,
            include_default_resources: true,
        }
    }
}

impl McpProviderConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            McpProviderConfig::Embedded(_) => "embedded",
            McpProviderConfig::Stdio(_) => "stdio",
            McpProviderConfig::Http(_) => "http",
            McpProviderConfig::Test(_) => "test",
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            McpProviderConfig::Embedded(config) => config.description.as_deref(),
            McpProviderConfig::Stdio(config) => config.description.as_deref(),
            McpProviderConfig::Http(config) => config.description.as_deref(),
            McpProviderConfig::Test(config) => config.description.as_deref(),
        }
    }

    /// Where the provider lives: a URL, a command line, or "in-process".
    pub fn target(&self) -> String {
        match self {
            McpProviderConfig::Embedded(config) => match &config.prompt_library_path {
                Some(path) => format!("in-process ({})", path_display(path)),
                None => "in-process".to_string(),
            },
            McpProviderConfig::Stdio(config) => {
                let mut parts = vec![config.command.clone()];
                parts.extend(config.args.iter().cloned());
                parts.join(" ")
            }
            McpProviderConfig::Http(config) => config.url.clone(),
            McpProviderConfig::Test(_) => "in-process (samples)".to_string(),
        }
    }
}

/// Deserialization shape for [`McpProviderConfig`]. Unknown fields are
/// ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProviderConfig {
    #[serde(rename = "type")]
    kind: Option<String>,
    description: Option<String>,
    prompt_library_path: Option<PathBuf>,
    command: Option<String>,
    args: Option<Vec<String>>,
    env: Option<HashMap<String, String>>,
    url: Option<String>,
    include_default_prompts: Option<bool>,
    include_default_tools: Option<bool>,
    include_default_resources: Option<bool>,
}

impl TryFrom<RawProviderConfig> for McpProviderConfig {
    type Error = String;

    fn try_from(raw: RawProviderConfig) -> Result<Self, Self::Error> {
        let kind = match raw.kind.as_deref().map(str::trim) {
            Some(kind) if !kind.is_empty() => kind.to_ascii_lowercase(),
            _ => match (&raw.command, &raw.url) {
                (Some(_), None) => "stdio".to_string(),
                (None, Some(_)) => "http".to_string(),
                (Some(_), Some(_)) => {
                    return Err(
                        "provider has both `command` and `url`; set `type` to choose one"
                            .to_string(),
                    )
                }
                (None, None) => {
                    return Err(
                        "provider type cannot be inferred; set `type` or provide `command` or `url`"
                            .to_string(),
                    )
                }
            },
        };

        match kind.as_str() {
            "embedded" => Ok(McpProviderConfig::Embedded(EmbeddedProviderConfig {
                description: raw.description,
                prompt_library_path: raw.prompt_library_path,
            })),
            "stdio" => {
                let command = raw
                    .command
                    .filter(|command| !command.trim().is_empty())
                    .ok_or_else(|| "stdio provider requires `command`".to_string())?;
                Ok(McpProviderConfig::Stdio(StdioProviderConfig {
                    description: raw.description,
                    command,
                    args: raw.args.unwrap_or_default(),
                    env: raw.env.unwrap_or_default(),
                }))
            }
            "http" | "streamable-http" | "streamable_http" => {
                let url = raw
                    .url
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| "http provider requires `url`".to_string())?;
                Ok(McpProviderConfig::Http(HttpProviderConfig {
                    description: raw.description,
                    url,
                }))
            }
            "test" => Ok(McpProviderConfig::Test(TestProviderConfig {
                description: raw.description,
                include_default_prompts: raw.include_default_prompts.unwrap_or(true),
                include_default_tools: raw.include_default_tools.unwrap_or(true),
                include_default_resources: raw.include_default_resources.unwrap_or(true),
            })),
            other => Err(format!("unsupported provider type: {other}")),
        }
    }
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
