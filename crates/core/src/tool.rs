//! Tool catalog and execution contracts.
//!
//! The orchestration loop only ever sees [`ToolExecutor`]: it lists the
//! catalog once per conversation and dispatches calls by name. Two executors
//! exist: the in-process [`ToolRegistry`] (backed by [`ToolHandler`]s) and a
//! remote MCP client in `kubesage-tools`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use crate::error::ToolError;

/// A catalog entry describing one callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// The unique name of this tool (e.g., "execute_promql").
    pub name: String,

    /// What the tool does (sent to the model).
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's parameters.
    #[serde(rename = "inputSchema", alias = "input_schema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// A request from a model to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id assigned by the backend; echoed back with the result.
    pub id: String,

    /// Name of the tool to execute.
    pub name: String,

    /// Arguments as a JSON object.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The text produced for one [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The id of the originating request.
    pub request_id: String,

    /// Result text (possibly an error description or truncated).
    pub text: String,
}

/// The capability the orchestration loop depends on.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// List the tool catalog.
    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError>;

    /// Execute a tool and return its textual result.
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError>;

    /// Look up a single tool's metadata.
    async fn get_tool(&self, name: &str) -> Result<Option<Tool>, ToolError> {
        Ok(self.list_tools().await?.into_iter().find(|t| t.name == name))
    }
}

/// An in-process tool implementation.
///
/// Handlers are registered in a [`ToolRegistry`], which exposes them to
/// the agent as a [`ToolExecutor`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn input_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError>;

    /// Describe this handler as a catalog entry.
    fn to_tool(&self) -> Tool {
        Tool {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// A registry of in-process tool handlers.
pub struct ToolRegistry {
    handlers: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. Replaces any existing handler with the same name.
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        let name = handler.name().to_string();
        self.handlers.insert(name, handler);
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    /// All catalog entries, sorted by name.
    pub fn tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.handlers.values().map(|h| h.to_tool()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        Ok(self.tools())
    }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        handler.execute(arguments).await
    }

    async fn get_tool(&self, name: &str) -> Result<Option<Tool>, ToolError> {
        Ok(self.get(name).map(|h| h.to_tool()))
    }
}
