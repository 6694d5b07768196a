//! Anthropic native backend.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Wire details:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Tool use through `tool_use` / `tool_result` content blocks, with tool
//!   results travelling back as a `user` message

use async_trait::async_trait;
use kubesage_core::error::ProviderError;
use kubesage_core::message::Turn;
use kubesage_core::provider::{ChatBackend, ModelReply, ProviderRequest, ToolDeclarations};
use kubesage_core::tool::{Tool, ToolCallRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::http;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4000;

/// Anthropic Messages API backend.
pub struct AnthropicBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    /// Create a new Anthropic backend.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: http::build_client(Duration::from_secs(300)),
        }
    }

    /// Use a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self
    }

    /// Split the transcript into the top-level system field and content messages.
    ///
    /// Consecutive tool results are merged into a single `user` message, as
    /// the API expects every `tool_result` for one assistant turn together.
    fn to_api_messages(turns: &[Turn]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for turn in turns {
            match turn {
                Turn::System { content } => system_parts.push(content),
                Turn::User { content } => result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text(content.clone()),
                }),
                Turn::Assistant { text, tool_calls } if tool_calls.is_empty() => {
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Text(text.clone().unwrap_or_default()),
                    });
                }
                Turn::Assistant { text, tool_calls } => {
                    let mut blocks: Vec<ContentBlock> = Vec::new();
                    if let Some(text) = text {
                        blocks.push(ContentBlock::Text { text: text.clone() });
                    }
                    for call in tool_calls {
                        blocks.push(ContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: serde_json::Value::Object(call.arguments.clone()),
                        });
                    }
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Turn::ToolResult { request_id, text, .. } => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: request_id.clone(),
                        content: text.clone(),
                    };
                    match result.last_mut() {
                        Some(AnthropicMessage {
                            role,
                            content: AnthropicContent::Blocks(blocks),
                        }) if role == "user" => blocks.push(block),
                        _ => result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, result)
    }

    /// Convert the catalog to Anthropic tool definitions.
    fn to_api_tools(tools: &[Tool]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }

    /// Convert an API response into a [`ModelReply`].
    fn to_reply(resp: AnthropicResponse) -> ModelReply {
        let mut segments = Vec::new();
        let mut calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text } => segments.push(text),
                ResponseContentBlock::ToolUse { id, name, input } => {
                    let arguments = match input {
                        serde_json::Value::Object(map) => map,
                        _ => serde_json::Map::new(),
                    };
                    calls.push(ToolCallRequest::new(id, name, arguments));
                }
                ResponseContentBlock::Other => {}
            }
        }

        ModelReply::from_parts(segments, calls)
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn declare_tools(&self, tools: &[Tool]) -> ToolDeclarations {
        ToolDeclarations(serde_json::json!(Self::to_api_tools(tools)))
    }

    async fn complete(&self, request: &ProviderRequest<'_>) -> Result<ModelReply, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let (system, messages) = Self::to_api_messages(request.turns);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if !request.tools.is_empty() {
            body["tools"] = request.tools.0.clone();
        }

        debug!(provider = "anthropic", model = %request.model, turns = request.turns.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::send_error)?;

        let response = http::check_status(response, "Anthropic").await?;
        let api_resp: AnthropicResponse = http::parse_json(response, "Anthropic").await?;

        debug!(stop_reason = ?api_resp.stop_reason, "Anthropic response received");
        Ok(Self::to_reply(api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(value: serde_json::Value) -> Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    fn transcript_with_tools() -> Vec<Turn> {
        vec![
            Turn::system("You are helpful"),
            Turn::user("Any alerts firing?"),
            Turn::assistant(
                Some("Let me check".into()),
                vec![
                    ToolCallRequest::new("toolu_1", "execute_promql", args(json!({"query": "ALERTS"}))),
                    ToolCallRequest::new("toolu_2", "get_label_values", args(json!({"label": "namespace"}))),
                ],
            ),
            Turn::tool_result("toolu_1", "execute_promql", "[]"),
            Turn::tool_result("toolu_2", "get_label_values", "[\"default\"]"),
        ]
    }

    #[test]
    fn constructor_with_base_url() {
        let backend = AnthropicBackend::new("sk-ant-test").with_base_url("https://custom.proxy.com/");
        assert_eq!(backend.base_url, "https://custom.proxy.com");
        assert_eq!(backend.name(), "anthropic");
    }

    #[test]
    fn system_is_lifted_out_of_messages() {
        let (system, messages) = AnthropicBackend::to_api_messages(&transcript_with_tools());
        assert_eq!(system.as_deref(), Some("You are helpful"));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
    }

    #[test]
    fn assistant_tool_calls_become_tool_use_blocks() {
        let (_, messages) = AnthropicBackend::to_api_messages(&transcript_with_tools());
        match &messages[1].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 3); // text + 2 tool_use
                match &blocks[1] {
                    ContentBlock::ToolUse { id, name, input } => {
                        assert_eq!(id, "toolu_1");
                        assert_eq!(name, "execute_promql");
                        assert_eq!(input["query"], "ALERTS");
                    }
                    other => panic!("Expected tool_use block, got {other:?}"),
                }
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn consecutive_tool_results_share_one_user_message() {
        let (_, messages) = AnthropicBackend::to_api_messages(&transcript_with_tools());
        assert_eq!(messages[2].role, "user");
        match &messages[2].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                match &blocks[0] {
                    ContentBlock::ToolResult { tool_use_id, content } => {
                        assert_eq!(tool_use_id, "toolu_1");
                        assert_eq!(content, "[]");
                    }
                    other => panic!("Expected tool_result block, got {other:?}"),
                }
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![Tool {
            name: "execute_promql".into(),
            description: "Run PromQL".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "query": {"type": "string"} },
                "required": ["query"]
            }),
        }];
        let api_tools = AnthropicBackend::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].name, "execute_promql");
        assert_eq!(api_tools[0].input_schema["type"].as_str(), Some("object"));
    }

    #[test]
    fn parse_text_response_concatenates_blocks() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-3-5-haiku",
                "content": [
                    {"type": "text", "text": "Hello "},
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "text", "text": "there"}
                ],
                "usage": {"input_tokens": 10, "output_tokens": 5},
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();
        assert_eq!(
            AnthropicBackend::to_reply(resp),
            ModelReply::Text(vec!["Hello ".into(), "there".into()])
        );
    }

    #[test]
    fn parse_tool_use_response() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "content": [
                    {"type": "text", "text": "Checking alerts"},
                    {"type": "tool_use", "id": "toolu_abc", "name": "execute_promql", "input": {"query": "ALERTS{alertstate=\"firing\"}"}}
                ],
                "stop_reason": "tool_use"
            }"#,
        )
        .unwrap();
        match AnthropicBackend::to_reply(resp) {
            ModelReply::ToolCalls { text, calls } => {
                assert_eq!(text.as_deref(), Some("Checking alerts"));
                assert_eq!(calls[0].id, "toolu_abc");
                assert_eq!(calls[0].arguments["query"], "ALERTS{alertstate=\"firing\"}");
            }
            other => panic!("Expected tool calls, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_sends_native_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "All quiet."}],
                "stop_reason": "end_turn"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("sk-ant-test").with_base_url(server.uri());
        let turns = vec![Turn::system("sys"), Turn::user("hi")];
        let tools = backend.declare_tools(&[]);
        let reply = backend
            .complete(&ProviderRequest {
                model: "claude-3-5-haiku",
                turns: &turns,
                tools: &tools,
                temperature: 0.0,
                max_tokens: None,
            })
            .await
            .unwrap();
        assert_eq!(reply, ModelReply::text("All quiet."));
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("bad").with_base_url(server.uri());
        let turns = vec![Turn::user("hi")];
        let tools = ToolDeclarations::default();
        let err = backend
            .complete(&ProviderRequest {
                model: "claude-3-5-haiku",
                turns: &turns,
                tools: &tools,
                temperature: 0.0,
                max_tokens: Some(10),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }
}
