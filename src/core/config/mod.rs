pub mod data;
pub mod io;

pub use data::{
    path_display, EmbeddedProviderConfig, HttpProviderConfig, McpProviderConfig,
    McpRegistryConfig, StdioProviderConfig, TestProviderConfig,
};
pub use io::{load_document, parse_document, ConfigError, ConfigFormat};

#[cfg(test)]
pub mod tests;
