//! Google Gemini backend.
//!
//! Talks to the `generateContent` REST endpoint. Gemini differs from the
//! other backends in a few ways:
//! - tools are declared as `functionDeclarations` with upper-case schema types
//! - the assistant role is called `model`
//! - function calls carry no id, so one is synthesized per call
//! - function results go back by tool name as `functionResponse` parts

use async_trait::async_trait;
use kubesage_core::error::ProviderError;
use kubesage_core::message::Turn;
use kubesage_core::provider::{ChatBackend, ModelReply, ProviderRequest, ToolDeclarations};
use kubesage_core::tool::{Tool, ToolCallRequest};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use crate::http;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini backend.
pub struct GeminiBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: http::build_client(Duration::from_secs(300)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self
    }

    /// Map a JSON-schema type name; unknown types fall back to STRING.
    fn gemini_type(json_type: &str) -> &'static str {
        match json_type {
            "number" => "NUMBER",
            "integer" => "INTEGER",
            "boolean" => "BOOLEAN",
            "array" => "ARRAY",
            "object" => "OBJECT",
            _ => "STRING",
        }
    }

    /// Recursively convert a JSON schema to Gemini's schema dialect.
    pub(crate) fn convert_schema(schema: &Value) -> Value {
        let schema_type = schema.get("type").and_then(Value::as_str).unwrap_or("string");

        let mut out = Map::new();
        out.insert("type".into(), json!(Self::gemini_type(schema_type)));
        out.insert(
            "description".into(),
            json!(schema.get("description").and_then(Value::as_str).unwrap_or("")),
        );

        if let Some(values) = schema.get("enum").and_then(Value::as_array) {
            out.insert("enum".into(), Value::Array(values.clone()));
        }

        if schema_type == "array" {
            if let Some(items) = schema.get("items").filter(|i| i.is_object()) {
                out.insert("items".into(), Self::convert_schema(items));
            }
        }

        if schema_type == "object" {
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                let converted: Map<String, Value> = props
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::convert_schema(v)))
                    .collect();
                out.insert("properties".into(), Value::Object(converted));
                if let Some(required) = schema.get("required") {
                    out.insert("required".into(), required.clone());
                }
            }
        }

        Value::Object(out)
    }

    /// Build `(systemInstruction, contents)` from the transcript.
    fn to_contents(turns: &[Turn]) -> (Option<Value>, Vec<Value>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();
        // Consecutive function responses are collected into one user message.
        let mut pending: Vec<Value> = Vec::new();

        let flush = |pending: &mut Vec<Value>, contents: &mut Vec<Value>| {
            if !pending.is_empty() {
                contents.push(json!({"role": "user", "parts": std::mem::take(pending)}));
            }
        };

        for turn in turns {
            match turn {
                Turn::System { content } => system_parts.push(content),
                Turn::User { content } => {
                    flush(&mut pending, &mut contents);
                    contents.push(json!({"role": "user", "parts": [{"text": content}]}));
                }
                Turn::Assistant { text, tool_calls } => {
                    flush(&mut pending, &mut contents);
                    let mut parts: Vec<Value> = Vec::new();
                    if let Some(text) = text {
                        parts.push(json!({"text": text}));
                    }
                    for call in tool_calls {
                        parts.push(json!({
                            "functionCall": {"name": call.name, "args": call.arguments}
                        }));
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                }
                Turn::ToolResult { name, text, .. } => {
                    pending.push(json!({
                        "functionResponse": {"name": name, "response": {"content": text}}
                    }));
                }
            }
        }
        flush(&mut pending, &mut contents);

        let system = (!system_parts.is_empty())
            .then(|| json!({"parts": [{"text": system_parts.join("\n\n")}]}));
        (system, contents)
    }

    fn to_reply(response: GeminiResponse) -> Result<ModelReply, ProviderError> {
        let parts = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        if parts.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "No response parts from Google Gemini. The model may have been blocked or returned an empty response."
                    .into(),
            ));
        }

        let mut segments = Vec::new();
        let mut calls = Vec::new();
        for part in parts {
            if let Some(call) = part.function_call {
                let arguments = match call.args {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                let id = format!("gemini-{}", uuid::Uuid::new_v4());
                calls.push(ToolCallRequest::new(id, call.name, arguments));
            } else if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                segments.push(text);
            }
        }

        if calls.is_empty() && segments.is_empty() {
            warn!("Gemini returned parts but no text content");
            return Err(ProviderError::InvalidResponse(
                "Model completed but returned no text response".into(),
            ));
        }

        Ok(ModelReply::from_parts(segments, calls))
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        "google"
    }

    fn declare_tools(&self, tools: &[Tool]) -> ToolDeclarations {
        if tools.is_empty() {
            return ToolDeclarations::default();
        }
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": Self::convert_schema(&t.input_schema),
                })
            })
            .collect();
        ToolDeclarations(json!([{"functionDeclarations": declarations}]))
    }

    async fn complete(&self, request: &ProviderRequest<'_>) -> Result<ModelReply, ProviderError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, request.model);
        let (system, contents) = Self::to_contents(request.turns);

        let mut generation_config = json!({"temperature": request.temperature});
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if let Some(system) = system {
            body["systemInstruction"] = system;
        }
        if !request.tools.is_empty() {
            body["tools"] = request.tools.0.clone();
        }

        debug!(provider = "google", model = %request.model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::send_error)?;

        let response = http::check_status(response, "Google Gemini").await?;
        let api_response: GeminiResponse = http::parse_json(response, "Google Gemini").await?;
        Self::to_reply(api_response)
    }
}

// --- Gemini API types ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn schema_conversion_is_recursive() {
        let schema = json!({
            "type": "object",
            "properties": {
                "goals": {
                    "type": "array",
                    "description": "Target domains",
                    "items": {"type": "string", "enum": ["log", "metric"]}
                },
                "limit": {"type": "integer"},
                "odd": {"type": "null"}
            },
            "required": ["goals"]
        });
        let converted = GeminiBackend::convert_schema(&schema);
        assert_eq!(converted["type"], "OBJECT");
        assert_eq!(converted["required"], json!(["goals"]));
        let goals = &converted["properties"]["goals"];
        assert_eq!(goals["type"], "ARRAY");
        assert_eq!(goals["description"], "Target domains");
        assert_eq!(goals["items"]["type"], "STRING");
        assert_eq!(goals["items"]["enum"], json!(["log", "metric"]));
        assert_eq!(converted["properties"]["limit"]["type"], "INTEGER");
        assert_eq!(converted["properties"]["odd"]["type"], "STRING");
    }

    #[test]
    fn declarations_are_wrapped_once() {
        let backend = GeminiBackend::new("key");
        let decl = backend.declare_tools(&[Tool {
            name: "execute_promql".into(),
            description: "Run PromQL".into(),
            input_schema: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        }]);
        let fns = decl.0[0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0]["parameters"]["properties"]["query"]["type"], "STRING");
        assert!(backend.declare_tools(&[]).is_empty());
    }

    #[test]
    fn tool_results_are_grouped_by_name() {
        let turns = vec![
            Turn::system("sys"),
            Turn::user("q"),
            Turn::assistant(
                None,
                vec![
                    ToolCallRequest::new("a", "execute_promql", Map::new()),
                    ToolCallRequest::new("b", "get_label_values", Map::new()),
                ],
            ),
            Turn::tool_result("a", "execute_promql", "one"),
            Turn::tool_result("b", "get_label_values", "two"),
        ];
        let (system, contents) = GeminiBackend::to_contents(&turns);
        assert_eq!(system.unwrap()["parts"][0]["text"], "sys");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        let parts = contents[2]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["functionResponse"]["name"], "get_label_values");
        assert_eq!(parts[1]["functionResponse"]["response"]["content"], "two");
    }

    #[test]
    fn function_calls_get_synthesized_ids() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "execute_promql", "args": {"query": "up"}}},
                {"functionCall": {"name": "execute_promql", "args": {"query": "ALERTS"}}}
            ]}}]
        }))
        .unwrap();
        match GeminiBackend::to_reply(resp).unwrap() {
            ModelReply::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 2);
                assert_ne!(calls[0].id, calls[1].id);
                assert_eq!(calls[1].arguments["query"], "ALERTS");
            }
            other => panic!("Expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn missing_parts_is_an_error() {
        let resp: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        let err = GeminiBackend::to_reply(resp).unwrap_err();
        assert!(err.to_string().contains("No response parts from Google Gemini"));
    }

    #[tokio::test]
    async fn complete_uses_goog_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Cluster healthy."}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = GeminiBackend::new("g-key").with_base_url(server.uri());
        let turns = vec![Turn::system("sys"), Turn::user("status?")];
        let tools = ToolDeclarations::default();
        let reply = backend
            .complete(&ProviderRequest {
                model: "gemini-2.0-flash",
                turns: &turns,
                tools: &tools,
                temperature: 0.0,
                max_tokens: Some(4000),
            })
            .await
            .unwrap();
        assert_eq!(reply, ModelReply::text("Cluster healthy."));
    }
}
