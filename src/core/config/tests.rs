use super::data::{
    path_display, HttpProviderConfig, McpProviderConfig, McpRegistryConfig, StdioProviderConfig,
    TestProviderConfig,
};
use super::io::{load_document, parse_document, ConfigError, ConfigFormat};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_registry(dir: &TempDir, file_name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(file_name);
    std::fs::write(&path, contents).expect("write registry");
    path
}

#[test]
fn json_registry_infers_types_from_fields() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_registry(
        &temp_dir,
        "servers.json",
        r#"{
            "servers": {
                "files": {
                    "command": "npx",
                    "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
                    "env": {"DEBUG": "1"}
                },
                "remote": {"url": "https://mcp.example.com", "description": "Remote"}
            }
        }"#,
    );

    let registry = McpRegistryConfig::load_from_path(&path).expect("load registry");
    assert_eq!(registry.servers.len(), 2);

    match &registry.servers["files"] {
        McpProviderConfig::Stdio(StdioProviderConfig {
            command, args, env, ..
        }) => {
            assert_eq!(command, "npx");
            assert_eq!(args.len(), 3);
            assert_eq!(env.get("DEBUG").map(String::as_str), Some("1"));
        }
        other => panic!("expected stdio provider, got {other:?}"),
    }
    assert_eq!(
        registry.servers["remote"],
        McpProviderConfig::Http(HttpProviderConfig {
            description: Some("Remote".to_string()),
            url: "https://mcp.example.com".to_string(),
        })
    );
}

#[test]
fn yaml_registry_honours_explicit_types() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_registry(
        &temp_dir,
        "servers.yml",
        "servers:\n  local:\n    type: embedded\n    description: Local prompts\n  samples:\n    type: test\n    includeDefaultTools: false\n",
    );

    let registry = McpRegistryConfig::load_from_path(&path).expect("load registry");
    assert_eq!(registry.servers["local"].kind_name(), "embedded");
    assert_eq!(
        registry.servers["local"].description(),
        Some("Local prompts")
    );
    assert_eq!(
        registry.servers["samples"],
        McpProviderConfig::Test(TestProviderConfig {
            description: None,
            include_default_prompts: true,
            include_default_tools: false,
            include_default_resources: true,
        })
    );
}

#[test]
fn toml_registry_is_supported() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_registry(
        &temp_dir,
        "servers.toml",
        "[servers.remote]\ntype = \"http\"\nurl = \"http://localhost:8080\"\n\n[servers.tool]\ncommand = \"my-server\"\nextra = \"ignored\"\n",
    );

    let registry = McpRegistryConfig::load_from_path(&path).expect("load registry");
    assert_eq!(registry.servers["remote"].kind_name(), "http");
    assert_eq!(registry.servers["tool"].target(), "my-server");
}

#[test]
fn entry_without_command_or_url_is_rejected() {
    let err = parse_document::<McpRegistryConfig>(
        Path::new("servers.json"),
        r#"{"servers": {"broken": {"description": "nothing to go on"}}}"#,
        ConfigFormat::Json,
    )
    .expect_err("type should not be inferable");

    assert!(matches!(err, ConfigError::Parse { format: ConfigFormat::Json, .. }));
    assert!(err.to_string().contains("cannot be inferred"));
    assert!(err.source().is_some());
}

#[test]
fn explicit_stdio_type_requires_command() {
    let err = parse_document::<McpRegistryConfig>(
        Path::new("servers.yaml"),
        "servers:\n  bad:\n    type: stdio\n",
        ConfigFormat::Yaml,
    )
    .expect_err("missing command");
    assert!(err.to_string().contains("requires `command`"));
}

#[test]
fn unknown_type_is_rejected() {
    let err = parse_document::<McpRegistryConfig>(
        Path::new("servers.json"),
        r#"{"servers": {"x": {"type": "websocket", "url": "ws://localhost"}}}"#,
        ConfigFormat::Json,
    )
    .expect_err("unknown type");
    assert!(err.to_string().contains("unsupported provider type: websocket"));
}

#[test]
fn unsupported_extension_is_reported() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_registry(&temp_dir, "servers.ini", "[servers]");

    let err = load_document::<McpRegistryConfig>(&path).expect_err("unsupported");
    assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
}

#[test]
fn missing_file_is_a_read_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("missing.json");

    let err = McpRegistryConfig::load_from_path(&path).expect_err("missing file");
    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().starts_with("Failed to read config at"));
}

#[test]
fn format_detection_is_case_insensitive() {
    assert_eq!(
        ConfigFormat::from_path(Path::new("a/servers.YAML")),
        Some(ConfigFormat::Yaml)
    );
    assert_eq!(
        ConfigFormat::from_path(Path::new("servers.Json")),
        Some(ConfigFormat::Json)
    );
    assert_eq!(ConfigFormat::from_path(Path::new("servers")), None);
}

#[test]
fn provider_config_serializes_with_type_tag() {
    let config = McpProviderConfig::Http(HttpProviderConfig {
        description: None,
        url: "http://localhost:3000".to_string(),
    });
    let value = serde_json::to_value(&config).expect("serialize");
    assert_eq!(value["type"], "http");
    assert_eq!(value["url"], "http://localhost:3000");

    let round_trip: McpProviderConfig = serde_json::from_value(value).expect("deserialize");
    assert_eq!(round_trip, config);
}

#[test]
fn unknown_provider_error_lists_alternatives() {
    let err = ConfigError::UnknownProvider {
        name: "nope".to_string(),
        available: vec!["embedded".to_string(), "test".to_string()],
    };
    assert_eq!(
        err.to_string(),
        "Unknown MCP provider 'nope'. Available: embedded, test"
    );
}

#[cfg(unix)]
#[test]
fn path_display_shortens_home() {
    let Some(home) = std::env::var_os("HOME") else {
        return;
    };
    let path = PathBuf::from(home).join(".config/mcplink/servers.yaml");
    assert_eq!(path_display(&path), "~/.config/mcplink/servers.yaml");
}
