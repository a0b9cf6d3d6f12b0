//! Command-line interface parsing and handling
//!
//! Every subcommand except `servers` and `serve` resolves one provider from
//! the registry, runs a single MCP operation and prints the result as JSON.

pub mod inspect;
pub mod provider_list;
pub mod serve;

use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::cli::inspect::{parse_prompt_arguments, parse_tool_arguments, run_operation, Operation};
use crate::cli::provider_list::list_servers;
use crate::cli::serve::serve_provider;
use crate::mcp::McpProviderRegistry;
use crate::utils::logging::init_logging;

pub const DEFAULT_SERVER: &str = "embedded";

#[derive(Parser, Debug)]
#[command(name = "mcplink")]
#[command(version)]
#[command(about = "Inspect and exercise Model Context Protocol servers")]
#[command(
    long_about = "mcplink connects to MCP servers over stdio, streamable HTTP, or in-process, \
and runs a single protocol operation per invocation. Results are printed as JSON.\n\n\
Registry:\n\
  Providers are read from --registry, else from $MCPLINK_REGISTRY, else from\n\
  servers.{yaml,yml,json,toml} in the user config directory. Without a registry\n\
  file the built-in 'embedded' and 'test' providers are available.\n\n\
Logging:\n\
  Logs go to stderr (or --log <file>). RUST_LOG overrides the default filter.\n\n\
Serving:\n\
  `mcplink serve` exposes an embedded or test provider on stdin/stdout;\n\
  `mcplink serve --http 127.0.0.1:8080` serves it at http://127.0.0.1:8080/mcp."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Registry file (.json, .yaml, .yml or .toml)
    #[arg(short = 'r', long, global = true, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Provider to use
    #[arg(short = 's', long, global = true, value_name = "NAME", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// List the providers in the registry
    Servers,
    /// List prompts
    PromptsList,
    /// Fill a prompt template
    PromptsGet {
        /// Prompt name
        name: String,
        /// Prompt argument as key=value (repeatable)
        #[arg(short = 'a', long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,
    },
    /// List tools
    ToolsList,
    /// Show one tool
    ToolsGet {
        /// Tool name
        name: String,
    },
    /// Call a tool
    ToolsCall {
        /// Tool name
        name: String,
        /// Arguments as a JSON object
        #[arg(long = "json", value_name = "OBJECT")]
        json: Option<String>,
        /// Argument as key=value; the value is parsed as JSON when possible (repeatable)
        #[arg(short = 'a', long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,
    },
    /// List resources
    ResourcesList,
    /// List resource templates
    ResourcesTemplatesList,
    /// Read a resource
    ResourcesRead {
        /// Resource URI
        uri: String,
    },
    /// Show the server's initialize result
    Capabilities,
    /// Serve an embedded or test provider over stdio, or over HTTP with --http
    Serve {
        /// Listen for streamable HTTP on this address instead of using stdio
        #[arg(long, value_name = "ADDR")]
        http: Option<SocketAddr>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose, args.log.as_deref())?;
    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

fn load_registry(path: Option<&Path>) -> Result<McpProviderRegistry, Box<dyn Error>> {
    Ok(match path {
        Some(path) => McpProviderRegistry::load_from_file(path)?,
        None => McpProviderRegistry::load_default()?,
    })
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let registry = load_registry(args.registry.as_deref())?;

    let operation = match args.command {
        Commands::Servers => {
            list_servers(&registry);
            return Ok(());
        }
        Commands::Serve { http } => return serve_provider(&registry, &args.server, http).await,
        Commands::PromptsList => Operation::ListPrompts,
        Commands::PromptsGet { name, args } => Operation::GetPrompt {
            name,
            arguments: parse_prompt_arguments(&args)?,
        },
        Commands::ToolsList => Operation::ListTools,
        Commands::ToolsGet { name } => Operation::GetTool { name },
        Commands::ToolsCall { name, json, args } => Operation::CallTool {
            name,
            arguments: parse_tool_arguments(json.as_deref(), &args)?,
        },
        Commands::ResourcesList => Operation::ListResources,
        Commands::ResourcesTemplatesList => Operation::ListResourceTemplates,
        Commands::ResourcesRead { uri } => Operation::ReadResource { uri },
        Commands::Capabilities => Operation::Capabilities,
    };

    let provider = registry.provider(&args.server)?;
    let outcome = run_operation(&provider, operation).await;
    if let Err(err) = provider.close().await {
        tracing::debug!(provider = %provider.name(), error = %err, "Error while closing MCP provider");
    }
    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
