use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::core::config::{
    ConfigError, EmbeddedProviderConfig, McpProviderConfig, McpRegistryConfig, TestProviderConfig,
};
use crate::mcp::client::McpProvider;
use crate::mcp::embedded::EmbeddedServer;
use crate::mcp::transport::{
    EmbeddedTransport, McpTransport, StdioLaunchConfig, StdioTransport, StreamableHttpTransport,
};

/// Named provider configurations and the factory that turns them into
/// [`McpProvider`]s.
#[derive(Debug, Clone)]
pub struct McpProviderRegistry {
    servers: BTreeMap<String, McpProviderConfig>,
}

impl Default for McpProviderRegistry {
    /// The in-process `embedded` and `test` providers.
    fn default() -> Self {
        let mut servers = BTreeMap::new();
        servers.insert(
            "embedded".to_string(),
            McpProviderConfig::Embedded(EmbeddedProviderConfig {
                description: Some("Embedded MCP provider with default libraries".to_string()),
                prompt_library_path: None,
            }),
        );
        servers.insert(
            "test".to_string(),
            McpProviderConfig::Test(TestProviderConfig {
                description: Some("Test provider with sample prompts and tools".to_string()),
                ..TestProviderConfig::default()
            }),
        );
        Self { servers }
    }
}

impl McpProviderRegistry {
    pub fn new(servers: BTreeMap<String, McpProviderConfig>) -> Self {
        Self { servers }
    }

    pub fn from_config(config: McpRegistryConfig) -> Self {
        Self::new(config.servers)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = McpRegistryConfig::load_from_path(path)?;
        debug!(path = %path.display(), providers = config.servers.len(), "Loaded MCP provider registry");
        Ok(Self::from_config(config))
    }

    /// Loads the default registry file when one exists, else the builtin
    /// providers.
    pub fn load_default() -> Result<Self, ConfigError> {
        match McpRegistryConfig::default_path() {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }

    pub fn configs(&self) -> impl Iterator<Item = (&str, &McpProviderConfig)> {
        self.servers
            .iter()
            .map(|(name, config)| (name.as_str(), config))
    }

    /// Exact match first, then case-insensitive.
    pub fn find_config(&self, name: &str) -> Option<(&str, &McpProviderConfig)> {
        if let Some((key, config)) = self.servers.get_key_value(name) {
            return Some((key.as_str(), config));
        }
        self.configs()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    fn require_config(&self, name: &str) -> Result<(&str, &McpProviderConfig), ConfigError> {
        self.find_config(name)
            .ok_or_else(|| ConfigError::UnknownProvider {
                name: name.to_string(),
                available: self.provider_names().into_iter().map(str::to_string).collect(),
            })
    }

    /// Builds a provider with a fresh transport. Nothing is launched or
    /// contacted until the first operation.
    pub fn provider(&self, name: &str) -> Result<McpProvider, ConfigError> {
        let (key, config) = self.require_config(name)?;
        let transport: Arc<dyn McpTransport> = match config {
            McpProviderConfig::Embedded(_) | McpProviderConfig::Test(_) => {
                Arc::new(EmbeddedTransport::new(Arc::new(self.embedded_server(key)?)))
            }
            McpProviderConfig::Stdio(stdio) => Arc::new(StdioTransport::new(
                key,
                StdioLaunchConfig {
                    command: stdio.command.clone(),
                    args: stdio.args.clone(),
                    env: stdio.env.clone(),
                },
            )),
            McpProviderConfig::Http(http) => Arc::new(
                StreamableHttpTransport::new(key, &http.url).map_err(|err| {
                    ConfigError::InvalidProvider {
                        name: key.to_string(),
                        message: err.to_string(),
                    }
                })?,
            ),
        };
        debug!(provider = key, transport = %transport.kind(), "Created MCP provider");
        Ok(McpProvider::new(key, transport))
    }

    /// In-process server for an `embedded` or `test` provider.
    pub fn embedded_server(&self, name: &str) -> Result<EmbeddedServer, ConfigError> {
        let (key, config) = self.require_config(name)?;
        match config {
            McpProviderConfig::Embedded(embedded) => EmbeddedServer::from_embedded_config(embedded),
            McpProviderConfig::Test(test) => Ok(EmbeddedServer::from_test_config(test)),
            other => Err(ConfigError::InvalidProvider {
                name: key.to_string(),
                message: format!(
                    "{} providers run out of process and cannot be served",
                    other.kind_name()
                ),
            }),
        }
    }
}
