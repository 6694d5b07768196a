//! The tool-calling loop shared by every model-driven bot.
//!
//! Each iteration sends the transcript to the backend. A text reply ends the
//! loop; tool calls are executed one at a time, in the order returned, and
//! their results appended before the next round-trip.

use kubesage_core::error::Error;
use kubesage_core::message::{Transcript, Turn};
use kubesage_core::progress::ProgressSink;
use kubesage_core::provider::{ChatBackend, ModelReply, ProviderRequest};
use kubesage_core::tool::{ToolCallRequest, ToolCallResult, ToolExecutor};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bot::BotSettings;
use crate::normalize::normalize_query;
use crate::truncate::truncate_result;

/// Returned when the iteration cap is reached.
pub const INCOMPLETE_ANALYSIS: &str = "Analysis incomplete. Please try a more specific question.";

/// Tools whose `query` argument is a Korrel8r query.
const CORRELATION_TOOLS: &[&str] = &["korrel8r_query_objects", "korrel8r_get_correlated"];

/// One run of the request/execute/respond cycle.
pub struct ToolCallingLoop<'a> {
    backend: &'a dyn ChatBackend,
    executor: &'a dyn ToolExecutor,
    model: &'a str,
    settings: &'a BotSettings,
}

impl<'a> ToolCallingLoop<'a> {
    pub fn new(
        backend: &'a dyn ChatBackend,
        executor: &'a dyn ToolExecutor,
        model: &'a str,
        settings: &'a BotSettings,
    ) -> Self {
        Self {
            backend,
            executor,
            model,
            settings,
        }
    }

    /// Drive the conversation to a final answer.
    ///
    /// Backend and catalog failures are turned into an error message.
    pub async fn run(&self, system_prompt: &str, question: &str, progress: Option<&dyn ProgressSink>) -> String {
        match self.drive(system_prompt, question, progress).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(backend = %self.backend.name(), model = %self.model, error = %e, "Tool calling failed");
                format!("Error during tool calling: {e}")
            }
        }
    }

    async fn drive(&self, system_prompt: &str, question: &str, progress: Option<&dyn ProgressSink>) -> Result<String, Error> {
        let mut transcript = Transcript::new(system_prompt, question);

        let catalog = self.executor.list_tools().await?;
        let declarations = self.backend.declare_tools(&catalog);
        debug!(tools = catalog.len(), backend = %self.backend.name(), "Tool catalog declared");

        for iteration in 1..=self.settings.max_iterations {
            report(progress, &format!("thinking... (iteration {iteration})"));
            debug!(iteration, turns = transcript.len(), "Loop iteration");

            let request = ProviderRequest {
                model: self.model,
                turns: transcript.turns(),
                tools: &declarations,
                temperature: self.settings.temperature,
                max_tokens: Some(self.settings.max_tokens),
            };

            let (text, calls) = match self.backend.complete(&request).await? {
                ModelReply::Text(segments) => {
                    info!(iteration, backend = %self.backend.name(), "Tool calling completed");
                    return Ok(strip_code_fence(&segments.concat()));
                }
                ModelReply::ToolCalls { text, calls } => (text, calls),
            };

            debug!(iteration, count = calls.len(), "Executing tool calls");
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let result = self.execute(call, progress).await;
                results.push(Turn::from_result(&call.name, result));
            }

            transcript.push(Turn::assistant(text, calls));
            for result in results {
                transcript.push(result);
            }

            let removed = transcript.trim_to(self.settings.effective_history_cap());
            if removed > 0 {
                debug!(removed, kept = transcript.len(), "Trimmed transcript");
            }
        }

        warn!(max_iterations = self.settings.max_iterations, model = %self.model, "Hit max iterations");
        Ok(INCOMPLETE_ANALYSIS.to_string())
    }

    /// Run one tool call; failures become the result text.
    async fn execute(&self, call: &ToolCallRequest, progress: Option<&dyn ProgressSink>) -> ToolCallResult {
        let mut arguments = call.arguments.clone();
        if CORRELATION_TOOLS.contains(&call.name.as_str()) {
            if let Some(Value::String(query)) = arguments.get("query") {
                let normalized = normalize_query(query);
                if &normalized != query {
                    info!(tool = %call.name, from = %query, to = %normalized, "Normalized correlation query");
                    arguments.insert("query".into(), Value::String(normalized));
                }
            }
        }

        report(progress, &format!("using tool: {}", call.name));

        let text = match self.executor.call_tool(&call.name, &arguments).await {
            Ok(text) => text,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("Error executing {}: {}", call.name, e)
            }
        };

        let bounded = truncate_result(&text, self.settings.max_tool_result_length);
        if bounded.len() != text.len() {
            debug!(tool = %call.name, original = text.len(), "Truncated tool result");
        }
        ToolCallResult {
            request_id: call.id.clone(),
            text: bounded,
        }
    }
}

/// Emit a progress message; a failing sink is logged and ignored.
fn report(progress: Option<&dyn ProgressSink>, message: &str) {
    if let Some(sink) = progress {
        if let Err(e) = sink.emit(message) {
            warn!(error = %e, "Progress sink failed");
        }
    }
}

/// Remove one pair of code fences wrapping the whole answer.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() >= 6 && trimmed.starts_with("```") && trimmed.ends_with("```") {
        let inner = &trimmed[3..trimmed.len() - 3];
        // Drop a language tag on the opening line.
        let inner = match inner.split_once('\n') {
            Some((tag, rest)) if !tag.trim().contains(char::is_whitespace) => rest,
            _ => inner,
        };
        if !inner.contains("```") {
            return inner.trim().to_string();
        }
    }
    text.to_string()
}
