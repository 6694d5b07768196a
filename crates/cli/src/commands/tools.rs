//! `kubesage tools`: list the tool catalog.

use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let executor = kubesage_tools::executor_from_config(&config);

    let source = match &config.mcp.url {
        Some(url) => format!("MCP server at {url}"),
        None => "in-process registry".to_string(),
    };
    println!("🔧 Tools ({source})");
    println!("========================================\n");

    let tools = executor.list_tools().await?;
    if tools.is_empty() {
        println!("  ⚠️  No tools available");
        return Ok(());
    }

    for tool in &tools {
        let summary = tool.description.lines().next().unwrap_or_default();
        println!("  {:<26} {summary}", tool.name);
    }
    println!();
    println!("  {} tool(s)", tools.len());
    if config.korrel8r.url.is_none() && config.mcp.url.is_none() {
        println!("  Set KORREL8R_URL to enable the correlation tools.");
    }

    Ok(())
}
