//! Scripted backend and recording executor shared by the agent tests.

use async_trait::async_trait;
use kubesage_core::error::{ProviderError, ToolError};
use kubesage_core::message::Turn;
use kubesage_core::provider::{ChatBackend, ModelReply, ProviderRequest, ToolDeclarations};
use kubesage_core::tool::{Tool, ToolCallRequest, ToolExecutor};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// Returns scripted replies in order and records every request.
pub struct SequentialMockBackend {
    replies: Mutex<Vec<Result<ModelReply, ProviderError>>>,
    repeat: Option<ModelReply>,
    requests: Mutex<Vec<(String, Vec<Turn>)>>,
}

impl SequentialMockBackend {
    pub fn new(mut replies: Vec<Result<ModelReply, ProviderError>>) -> Self {
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns `reply` on every call.
    pub fn always(reply: ModelReply) -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            repeat: Some(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A reply requesting one tool call with JSON `args`.
    pub fn tool_call(id: &str, name: &str, args: &str) -> ModelReply {
        let arguments: Map<String, Value> = serde_json::from_str(args).unwrap();
        ModelReply::ToolCalls {
            text: None,
            calls: vec![ToolCallRequest::new(id, name, arguments)],
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn models(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, turns)| match turns.first() {
                Some(Turn::System { content }) => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn transcript_lengths(&self) -> Vec<usize> {
        self.requests.lock().unwrap().iter().map(|(_, t)| t.len()).collect()
    }

    pub fn first_turns(&self) -> Vec<Turn> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, t)| t.first().cloned())
            .collect()
    }

    /// The transcript sent with the most recent request.
    pub fn last_turns(&self) -> Vec<Turn> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, t)| t.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatBackend for SequentialMockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn declare_tools(&self, tools: &[Tool]) -> ToolDeclarations {
        ToolDeclarations(Value::Array(
            tools.iter().map(|t| Value::String(t.name.clone())).collect(),
        ))
    }

    async fn complete(&self, request: &ProviderRequest<'_>) -> Result<ModelReply, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.model.to_string(), request.turns.to_vec()));

        if let Some(reply) = &self.repeat {
            return Ok(reply.clone());
        }
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".into())))
    }
}

/// An executor with canned results that records every call.
pub struct RecordingExecutor {
    tools: Vec<Tool>,
    responses: HashMap<String, String>,
    failures: HashMap<String, ToolError>,
    list_error: Option<ToolError>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl RecordingExecutor {
    pub fn empty() -> Self {
        Self {
            tools: Vec::new(),
            responses: HashMap::new(),
            failures: HashMap::new(),
            list_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Offers `execute_promql`, answering with a one-sample vector.
    pub fn with_promql() -> Self {
        let mut executor = Self::empty();
        executor.tools.push(Tool {
            name: "execute_promql".into(),
            description: "Run a PromQL query".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        });
        executor.responses.insert(
            "execute_promql".into(),
            r#"{"status":"success","results":[{"metric":{},"value":[1700000000,"1"]}]}"#.into(),
        );
        executor
    }

    /// Fails `list_tools`, as an unreachable remote catalog would.
    pub fn unreachable() -> Self {
        let mut executor = Self::empty();
        executor.list_error = Some(ToolError::Unavailable {
            service: "MCP server".into(),
            reason: "connection refused".into(),
        });
        executor
    }

    pub fn responding(mut self, name: &str, text: impl Into<String>) -> Self {
        self.responses.insert(name.into(), text.into());
        self
    }

    pub fn failing(mut self, name: &str, error: ToolError) -> Self {
        self.failures.insert(name.into(), error);
        self
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        match &self.list_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.tools.clone()),
        }
    }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        if let Some(e) = self.failures.get(name) {
            return Err(e.clone());
        }
        Ok(self
            .responses
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("{{\"status\":\"success\",\"tool\":\"{name}\"}}")))
    }
}
