//! ChatBackend trait: the abstraction over model backends.
//!
//! A backend knows how to send a transcript plus tool declarations to a
//! model and report back either final text or the tool calls the model
//! wants executed.
//!
//! Implementations: Anthropic Messages, OpenAI-compatible chat completions
//! (hosted OpenAI and local Llama Stack), Google Gemini.

use async_trait::async_trait;
use serde_json::Value;
use crate::error::ProviderError;
use crate::message::Turn;
use crate::tool::{Tool, ToolCallRequest};

/// The tool catalog already translated into a backend's native format.
///
/// Produced once per conversation by [`ChatBackend::declare_tools`] and
/// reused for every iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolDeclarations(pub Value);

impl ToolDeclarations {
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }
}

/// One model round-trip.
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    /// Model identifier as the backend expects it.
    pub model: &'a str,

    /// The full transcript, system prompt first.
    pub turns: &'a [Turn],

    /// Native tool declarations.
    pub tools: &'a ToolDeclarations,

    /// Temperature (0.0 = deterministic)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

/// What a model answered.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Plain text, as the text segments the backend returned.
    Text(Vec<String>),

    /// The model wants tools executed, in the given order.
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

impl ModelReply {
    /// A single-segment text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(vec![text.into()])
    }

    /// Build a reply from parsed parts: tool calls win over text.
    pub fn from_parts(segments: Vec<String>, calls: Vec<ToolCallRequest>) -> Self {
        if calls.is_empty() {
            Self::Text(segments)
        } else {
            let text = segments.concat();
            Self::ToolCalls {
                text: (!text.is_empty()).then_some(text),
                calls,
            }
        }
    }
}

/// The core backend trait.
///
/// The orchestration loop calls `complete()` without knowing which backend
/// is in use.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// A short name for this backend (e.g., "anthropic", "llama").
    fn name(&self) -> &str;

    /// Translate the shared catalog into this backend's declaration format.
    fn declare_tools(&self, tools: &[Tool]) -> ToolDeclarations;

    /// Send the transcript and get the model's reply.
    async fn complete(&self, request: &ProviderRequest<'_>) -> Result<ModelReply, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn tool_calls_take_precedence_over_text() {
        let reply = ModelReply::from_parts(
            vec!["Let me check".into()],
            vec![ToolCallRequest::new("1", "execute_promql", Map::new())],
        );
        match reply {
            ModelReply::ToolCalls { text, calls } => {
                assert_eq!(text.as_deref(), Some("Let me check"));
                assert_eq!(calls.len(), 1);
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn text_reply_keeps_segments() {
        let reply = ModelReply::from_parts(vec!["a".into(), "b".into()], vec![]);
        assert_eq!(reply, ModelReply::Text(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn declarations_emptiness() {
        assert!(ToolDeclarations::default().is_empty());
        assert!(ToolDeclarations(serde_json::json!([])).is_empty());
        assert!(!ToolDeclarations(serde_json::json!([{"name": "x"}])).is_empty());
    }
}
