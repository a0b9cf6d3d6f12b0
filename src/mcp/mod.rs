//! Model Context Protocol client engine.
//!
//! [`client::McpProvider`] is the entry point: it owns a transport, gates
//! every operation behind the initialization handshake, and decodes results
//! into `rust_mcp_schema` types. [`embedded`] holds the in-process server
//! used by the embedded and test providers.

pub mod client;
pub mod embedded;
pub mod error;
pub mod jsonrpc;
pub mod pending;
pub mod registry;
pub mod session;
pub mod transport;

pub use client::McpProvider;
pub use error::McpError;
pub use registry::McpProviderRegistry;

/// Protocol version requested during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_CLIENT_NAME: &str = "mcplink";
pub const MCP_CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_NOTIFICATIONS_CLOSE: &str = "notifications/close";
pub const METHOD_PROMPTS_LIST: &str = "prompts/list";
pub const METHOD_PROMPTS_GET: &str = "prompts/get";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
pub const METHOD_RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
pub const METHOD_RESOURCES_READ: &str = "resources/read";
