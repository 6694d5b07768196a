//! OpenAI-compatible backend implementation.
//!
//! Works with hosted OpenAI and with a local Llama Stack server, both of
//! which expose a `/chat/completions` endpoint.
//!
//! Supports:
//! - Chat completions (non-streaming)
//! - Tool use / function calling

use async_trait::async_trait;
use kubesage_core::error::ProviderError;
use kubesage_core::message::Turn;
use kubesage_core::provider::{ChatBackend, ModelReply, ProviderRequest, ToolDeclarations};
use kubesage_core::tool::{Tool, ToolCallRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::http;

/// Default base URL of a local Llama Stack server.
pub const LLAMA_STACK_DEFAULT_URL: &str = "http://localhost:8321/v1/openai/v1";

/// An OpenAI-compatible model backend.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: http::build_client(Duration::from_secs(300)),
        }
    }

    /// Create an OpenAI backend (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create a local Llama Stack backend (convenience constructor).
    ///
    /// Llama Stack doesn't check the token, but the client still sends one.
    pub fn llama_stack(base_url: Option<&str>, token: Option<String>) -> Self {
        Self::new(
            "llama",
            base_url.unwrap_or(LLAMA_STACK_DEFAULT_URL),
            token.unwrap_or_else(|| "dummy".into()),
        )
    }

    /// Use a custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self
    }

    /// Convert the transcript to OpenAI API format.
    fn to_api_messages(turns: &[Turn]) -> Vec<ApiMessage> {
        turns
            .iter()
            .map(|turn| match turn {
                Turn::System { content } => ApiMessage::plain("system", content),
                Turn::User { content } => ApiMessage::plain("user", content),
                Turn::Assistant { text, tool_calls } => ApiMessage {
                    role: "assistant".into(),
                    content: text.clone(),
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            tool_calls
                                .iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: "function".into(),
                                    function: ApiFunction {
                                        name: tc.name.clone(),
                                        arguments: serde_json::Value::Object(tc.arguments.clone()).to_string(),
                                    },
                                })
                                .collect(),
                        )
                    },
                    tool_call_id: None,
                },
                Turn::ToolResult { request_id, text, .. } => ApiMessage {
                    role: "tool".into(),
                    content: Some(text.clone()),
                    tool_calls: None,
                    tool_call_id: Some(request_id.clone()),
                },
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[Tool]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    /// Turn the first choice into a [`ModelReply`].
    fn to_reply(&self, response: ApiResponse) -> Result<ModelReply, ProviderError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = match serde_json::from_str::<serde_json::Value>(&tc.function.arguments) {
                    Ok(serde_json::Value::Object(map)) => map,
                    _ => {
                        warn!(
                            provider = %self.name,
                            tool = %tc.function.name,
                            "Could not parse tool arguments, using empty object"
                        );
                        serde_json::Map::new()
                    }
                };
                ToolCallRequest::new(tc.id, tc.function.name, arguments)
            })
            .collect();

        let segments = choice.message.content.into_iter().collect();
        Ok(ModelReply::from_parts(segments, calls))
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare_tools(&self, tools: &[Tool]) -> ToolDeclarations {
        ToolDeclarations(serde_json::json!(Self::to_api_tools(tools)))
    }

    async fn complete(&self, request: &ProviderRequest<'_>) -> Result<ModelReply, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.turns),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = request.tools.0.clone();
            body["tool_choice"] = serde_json::json!("auto");
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::send_error)?;

        let response = http::check_status(response, &self.name).await?;
        let api_response: ApiResponse = http::parse_json(response, &self.name).await?;
        self.to_reply(api_response)
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}
