use crate::core::config::data::{path_display, McpRegistryConfig};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit registry file.
pub const REGISTRY_ENV_VAR: &str = "MCPLINK_REGISTRY";

const REGISTRY_FILE_NAMES: [&str; 4] = ["servers.yaml", "servers.yml", "servers.json", "servers.toml"];

/// Serialization formats accepted for registry and prompt library files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Picks the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(ConfigFormat::Json),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigFormat::Json => "JSON",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Toml => "TOML",
        }
    }
}

#[derive(Debug)]
pub enum ParseErrorSource {
    Json(serde_json::Error),
    Yaml(serde_yaml::Error),
    Toml(toml::de::Error),
}

impl fmt::Display for ParseErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorSource::Json(err) => write!(f, "{err}"),
            ParseErrorSource::Yaml(err) => write!(f, "{err}"),
            ParseErrorSource::Toml(err) => write!(f, "{err}"),
        }
    }
}

/// Errors that can occur when loading configuration from disk or building
/// providers from it.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file contents did not deserialize.
    Parse {
        path: PathBuf,
        format: ConfigFormat,
        source: ParseErrorSource,
    },

    /// The file extension is not one of `.json`, `.yaml`, `.yml`, `.toml`.
    UnsupportedFormat { path: PathBuf },

    /// No provider with this name is registered.
    UnknownProvider { name: String, available: Vec<String> },

    /// A registered provider could not be turned into a client.
    InvalidProvider { name: String, message: String },
}

impl ConfigError {
    fn display_path(path: &Path) -> String {
        path_display(path)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read config at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::Parse {
                path,
                format,
                source,
            } => {
                write!(
                    f,
                    "Failed to parse {} config at {}: {}",
                    format.as_str(),
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::UnsupportedFormat { path } => {
                write!(
                    f,
                    "Unsupported config format at {} (expected .json, .yaml, .yml or .toml)",
                    Self::display_path(path)
                )
            }
            ConfigError::UnknownProvider { name, available } => {
                if available.is_empty() {
                    write!(f, "Unknown MCP provider '{name}'")
                } else {
                    write!(
                        f,
                        "Unknown MCP provider '{}'. Available: {}",
                        name,
                        available.join(", ")
                    )
                }
            }
            ConfigError::InvalidProvider { name, message } => {
                write!(f, "Invalid MCP provider '{name}': {message}")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => match source {
                ParseErrorSource::Json(err) => Some(err),
                ParseErrorSource::Yaml(err) => Some(err),
                ParseErrorSource::Toml(err) => Some(err),
            },
            ConfigError::UnsupportedFormat { .. }
            | ConfigError::UnknownProvider { .. }
            | ConfigError::InvalidProvider { .. } => None,
        }
    }
}

/// Parses `contents` as `format`. `path` is only used for error reporting.
pub fn parse_document<T: DeserializeOwned>(
    path: &Path,
    contents: &str,
    format: ConfigFormat,
) -> Result<T, ConfigError> {
    let parsed = match format {
        ConfigFormat::Json => serde_json::from_str(contents).map_err(ParseErrorSource::Json),
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(ParseErrorSource::Yaml),
        ConfigFormat::Toml => toml::from_str(contents).map_err(ParseErrorSource::Toml),
    };
    parsed.map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        format,
        source,
    })
}

/// Reads and parses a file, choosing the parser by extension.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(path, &contents, format)
}

impl McpRegistryConfig {
    pub fn load_from_path(path: &Path) -> Result<McpRegistryConfig, ConfigError> {
        load_document(path)
    }

    /// Default registry location: `MCPLINK_REGISTRY` when set, else the
    /// first `servers.*` file present in the user config directory.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(REGISTRY_ENV_VAR).filter(|value| !value.is_empty()) {
            return Some(PathBuf::from(path));
        }
        let config_dir = Self::config_dir()?;
        REGISTRY_FILE_NAMES
            .iter()
            .map(|name| config_dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("org", "mcplink", "mcplink").map(|dirs| dirs.config_dir().to_path_buf())
    }
}
