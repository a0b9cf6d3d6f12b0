use crate::mcp::McpProviderRegistry;

/// Markdown-style table of registered providers.
pub fn format_servers(registry: &McpProviderRegistry) -> String {
    let mut table = String::from("| Name | Type | Target | Description |\n|---|---|---|---|\n");
    for (name, config) in registry.configs() {
        table.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            name,
            config.kind_name(),
            config.target(),
            config.description().unwrap_or("")
        ));
    }
    table
}

pub fn list_servers(registry: &McpProviderRegistry) {
    if registry.configs().next().is_none() {
        println!("No MCP providers configured.");
        return;
    }
    println!("MCP Providers:\n");
    print!("{}", format_servers(registry));
}
