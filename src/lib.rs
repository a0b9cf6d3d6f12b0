//! mcplink is a client engine for the Model Context Protocol.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`mcp`] owns the JSON-RPC codec, the pending-request table, the
//!   embedded/stdio/streamable HTTP transports, the session handshake and the
//!   [`mcp::McpProvider`] façade.
//! - [`core`] loads the provider registry from JSON, YAML or TOML.
//! - [`cli`] parses command-line arguments and runs one provider operation
//!   per invocation, or serves an embedded provider over stdio or HTTP.
//! - [`utils`] holds logging setup.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod cli;
pub mod core;
pub mod mcp;
pub mod utils;
