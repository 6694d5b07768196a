//! Tool executors for KubeSage.
//!
//! Two ways to run the catalog:
//! - in-process: a [`ToolRegistry`] holding the Prometheus tools, plus the
//!   Korrel8r tools when a Korrel8r URL is configured
//! - remote: [`McpExecutor`], forwarding to an MCP server over HTTP

mod http;

pub mod korrel8r;
pub mod mcp;
pub mod prometheus;

use kubesage_config::AppConfig;
use kubesage_core::tool::{ToolExecutor, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use korrel8r::{GetCorrelatedTool, Korrel8rClient, QueryObjectsTool};
pub use mcp::McpExecutor;
pub use prometheus::{ExecutePromqlTool, GetLabelValuesTool, PrometheusClient};

/// Build the in-process registry from configuration.
pub fn default_registry(config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let prometheus = Arc::new(PrometheusClient::from_config(&config.prometheus));
    registry.register(Box::new(ExecutePromqlTool::new(prometheus.clone())));
    registry.register(Box::new(GetLabelValuesTool::new(prometheus)));

    let token = config.prometheus.resolved_token();
    if let Some(client) = Korrel8rClient::from_config(&config.korrel8r, token) {
        let client = Arc::new(client);
        registry.register(Box::new(QueryObjectsTool::new(client.clone())));
        registry.register(Box::new(GetCorrelatedTool::new(client)));
    }

    registry
}

/// The executor a chat should use: remote MCP when `[mcp] url` is set,
/// otherwise the in-process registry.
pub fn executor_from_config(config: &AppConfig) -> Arc<dyn ToolExecutor> {
    match config.mcp.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => {
            info!(url = %url, "Using remote MCP tool executor");
            Arc::new(
                McpExecutor::new(url)
                    .with_token(config.prometheus.resolved_token())
                    .with_timeout(Duration::from_secs(config.backend_timeout_secs)),
            )
        }
        None => {
            let registry = default_registry(config);
            info!(tools = registry.len(), "Using in-process tool registry");
            Arc::new(registry)
        }
    }
}
