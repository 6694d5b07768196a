//! A bot: one variant bound to a model, a tool executor, and (for the
//! model-driven variants) a chat backend.
//!
//! Bots are built per request by [`crate::factory::create_bot`] and hold no
//! conversation state between calls.

use chrono::{DateTime, Utc};
use kubesage_config::AppConfig;
use kubesage_core::message::MIN_HISTORY_CAP;
use kubesage_core::progress::{ProgressEntry, ProgressLog, ProgressSink, Tee};
use kubesage_core::provider::ChatBackend;
use kubesage_core::tool::ToolExecutor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::deterministic;
use crate::loop_runner::ToolCallingLoop;
use crate::prompt::build_system_prompt;
use crate::variant::BotVariant;

/// Tunables for one bot.
#[derive(Debug, Clone, PartialEq)]
pub struct BotSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on transcript length, system prompt included. Values
    /// below [`MIN_HISTORY_CAP`] are raised to it; see
    /// [`BotSettings::effective_history_cap`].
    pub history_cap: usize,
    pub max_iterations: u32,
    pub max_tool_result_length: usize,
}

impl BotSettings {
    /// Built-in defaults for a variant.
    pub fn for_variant(variant: BotVariant) -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4000,
            history_cap: 10,
            max_iterations: variant.max_iterations(),
            max_tool_result_length: variant.max_tool_result_length(),
        }
    }

    /// Defaults overlaid with `[providers.<variant>]` and the global settings.
    pub fn from_config(variant: BotVariant, config: &AppConfig) -> Self {
        let provider = config.provider(variant.config_key());
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            history_cap: config.history_cap,
            max_iterations: provider
                .and_then(|p| p.max_iterations)
                .unwrap_or_else(|| variant.max_iterations()),
            max_tool_result_length: provider
                .and_then(|p| p.max_tool_result_length)
                .unwrap_or_else(|| variant.max_tool_result_length()),
        }
    }

    /// The cap the loop actually trims to.
    pub fn effective_history_cap(&self) -> usize {
        self.history_cap.max(MIN_HISTORY_CAP)
    }
}

/// Everything about one chat, suitable for `--json` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReport {
    pub response: String,
    pub progress_log: Vec<ProgressEntry>,
    pub model: String,
    /// Number of model round-trips, counted from the progress log.
    pub iterations: usize,
    pub timestamp: DateTime<Utc>,
}

pub struct Bot {
    variant: BotVariant,
    model: String,
    api_key: Option<String>,
    executor: Arc<dyn ToolExecutor>,
    backend: Option<Arc<dyn ChatBackend>>,
    settings: BotSettings,
}

impl Bot {
    pub fn new(
        variant: BotVariant,
        model: impl Into<String>,
        api_key: Option<String>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            variant,
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            executor,
            backend: None,
            settings: BotSettings::for_variant(variant),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_settings(mut self, settings: BotSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn variant(&self) -> BotVariant {
        self.variant
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// The model name sent to the backend.
    pub fn model_identifier(&self) -> String {
        self.variant.extract_model_identifier(&self.model)
    }

    pub fn max_tool_result_length(&self) -> usize {
        self.settings.max_tool_result_length
    }

    pub fn system_prompt(&self, namespace: Option<&str>) -> String {
        build_system_prompt(namespace, self.variant.addendum())
    }

    /// Answer one question. Never fails: errors come back as text.
    pub async fn chat(&self, question: &str, namespace: Option<&str>, progress: Option<&dyn ProgressSink>) -> String {
        info!(variant = %self.variant, model = %self.model, "Chat request");

        if self.variant == BotVariant::Deterministic {
            return deterministic::respond(self.executor.as_ref(), question, progress).await;
        }

        if self.variant.requires_api_key() && self.api_key.is_none() {
            warn!(variant = %self.variant, model = %self.model, "Missing API key");
            return format!(
                "API key required for {} model {}. Please provide an API key.",
                self.variant.display_name(),
                self.model
            );
        }

        let Some(backend) = &self.backend else {
            error!(variant = %self.variant, model = %self.model, "No chat backend configured");
            return format!(
                "Error during tool calling: no backend configured for {} model {}",
                self.variant.display_name(),
                self.model
            );
        };

        let model = self.model_identifier();
        let system_prompt = self.system_prompt(namespace);
        ToolCallingLoop::new(backend.as_ref(), self.executor.as_ref(), &model, &self.settings)
            .run(&system_prompt, question, progress)
            .await
    }

    /// Like [`Bot::chat`], also recording progress into a [`ChatReport`].
    pub async fn chat_report(
        &self,
        question: &str,
        namespace: Option<&str>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> ChatReport {
        let log = Arc::new(ProgressLog::new());
        let mut sinks: Vec<Arc<dyn ProgressSink>> = vec![log.clone()];
        sinks.extend(progress);
        let tee = Tee(sinks);

        let response = self.chat(question, namespace, Some(&tee)).await;
        let progress_log = log.entries();
        let iterations = progress_log
            .iter()
            .filter(|e| e.message.contains("iteration"))
            .count();

        ChatReport {
            response,
            progress_log,
            model: self.model.clone(),
            iterations,
            timestamp: Utc::now(),
        }
    }

    /// Whether the executor offers at least one tool.
    pub async fn check_tools(&self) -> bool {
        match self.executor.list_tools().await {
            Ok(tools) if !tools.is_empty() => {
                info!(count = tools.len(), "Tool executor ready");
                true
            }
            Ok(_) => {
                error!("Tool executor has no tools");
                false
            }
            Err(e) => {
                error!(error = %e, "Tool executor check failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("variant", &self.variant)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordingExecutor, SequentialMockBackend};
    use kubesage_config::ProviderConfig;
    use kubesage_core::provider::ModelReply;

    #[tokio::test]
    async fn missing_key_short_circuits() {
        let backend = Arc::new(SequentialMockBackend::new(vec![]));
        let executor = Arc::new(RecordingExecutor::with_promql());
        let bot = Bot::new(BotVariant::OpenAi, "openai/gpt-4o-mini", Some("  ".into()), executor.clone())
            .with_backend(backend.clone());

        let answer = bot.chat("How many pods?", None, None).await;
        assert_eq!(
            answer,
            "API key required for OpenAI model openai/gpt-4o-mini. Please provide an API key."
        );
        assert_eq!(backend.call_count(), 0);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn backend_receives_bare_model_name() {
        let backend = Arc::new(SequentialMockBackend::new(vec![Ok(ModelReply::text("fine"))]));
        let bot = Bot::new(
            BotVariant::Anthropic,
            "anthropic/claude-3-5-haiku",
            Some("sk-ant".into()),
            Arc::new(RecordingExecutor::with_promql()),
        )
        .with_backend(backend.clone());

        assert_eq!(bot.chat("status?", Some("shop"), None).await, "fine");
        assert_eq!(backend.models(), vec!["claude-3-5-haiku"]);
        let system = backend.system_prompts();
        assert!(system[0].contains("Scope: namespace shop"));
        assert!(system[0].contains("CLAUDE-SPECIFIC INSTRUCTIONS"));
    }

    #[tokio::test]
    async fn report_counts_iterations() {
        let backend = Arc::new(SequentialMockBackend::new(vec![
            Ok(SequentialMockBackend::tool_call("c1", "execute_promql", r#"{"query":"up"}"#)),
            Ok(ModelReply::text("done")),
        ]));
        let bot = Bot::new(BotVariant::Llama, "meta-llama/Llama-3.1-8B-Instruct", None, Arc::new(RecordingExecutor::with_promql()))
            .with_backend(backend);

        let report = bot.chat_report("up?", None, None).await;
        assert_eq!(report.response, "done");
        assert_eq!(report.iterations, 2);
        assert_eq!(report.model, "meta-llama/Llama-3.1-8B-Instruct");
        let messages: Vec<_> = report.progress_log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["thinking... (iteration 1)", "using tool: execute_promql", "thinking... (iteration 2)"]
        );
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["progress_log"][0]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn check_tools_reports_catalog() {
        let bot = Bot::new(BotVariant::Deterministic, "x", None, Arc::new(RecordingExecutor::with_promql()));
        assert!(bot.check_tools().await);

        let empty = Bot::new(BotVariant::Deterministic, "x", None, Arc::new(RecordingExecutor::empty()));
        assert!(!empty.check_tools().await);
    }

    #[test]
    fn settings_from_config_override_defaults() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "google".into(),
            ProviderConfig {
                max_iterations: Some(4),
                ..Default::default()
            },
        );
        let google = BotSettings::from_config(BotVariant::Google, &config);
        assert_eq!(google.max_iterations, 4);
        assert_eq!(google.max_tool_result_length, 10_000);

        let anthropic = BotSettings::from_config(BotVariant::Anthropic, &config);
        assert_eq!(anthropic.max_iterations, 30);
        assert_eq!(anthropic.history_cap, config.history_cap);
    }

    #[test]
    fn debug_redacts_key() {
        let bot = Bot::new(BotVariant::OpenAi, "gpt-4o", Some("sk-secret".into()), Arc::new(RecordingExecutor::empty()));
        let rendered = format!("{bot:?}");
        assert!(!rendered.contains("sk-secret"));
    }
}
