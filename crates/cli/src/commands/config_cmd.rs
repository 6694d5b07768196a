//! `kubesage config`: validate configuration.

use kubesage_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, print_default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if print_default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    println!("🔍 Validating configuration...");
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e);
        }
    };
    println!("   ✅ Config parsed successfully");

    println!();
    println!("   Model:       {}", config.default_model);
    println!("   Prometheus:  {}", config.prometheus.url);
    println!(
        "   Korrel8r:    {}",
        config.korrel8r.url.as_deref().unwrap_or("not configured")
    );
    println!(
        "   MCP server:  {}",
        config.mcp.url.as_deref().unwrap_or("not configured (in-process tools)")
    );
    println!("   History cap: {} turns", config.history_cap);
    let mut providers: Vec<&str> = config
        .providers
        .iter()
        .filter(|(_, p)| p.api_key.is_some())
        .map(|(name, _)| name.as_str())
        .collect();
    providers.sort_unstable();
    if providers.is_empty() {
        println!("   API keys:    none");
    } else {
        println!("   API keys:    {}", providers.join(", "));
    }

    Ok(())
}
