//! Model identifier routing and bot construction.

use kubesage_config::AppConfig;
use kubesage_core::error::Error;
use kubesage_core::provider::ChatBackend;
use kubesage_core::tool::ToolExecutor;
use kubesage_providers::{AnthropicBackend, GeminiBackend, OpenAiCompatBackend};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::bot::{Bot, BotSettings};
use crate::variant::BotVariant;

/// Substring (or prefix) markers for hosted providers, checked in order.
const HOSTED_PATTERNS: &[(BotVariant, &[(&str, bool)])] = &[
    (BotVariant::Anthropic, &[("anthropic/", false), ("claude", false)]),
    (BotVariant::OpenAi, &[("openai/", false), ("gpt-", true), ("o1-", true)]),
    (BotVariant::Google, &[("google/", false), ("gemini", false)]),
];

/// Local families, matched against the id with `-` replaced by `.`.
/// `None` sizes match any parameter count.
const LOCAL_PATTERNS: &[(&str, BotVariant, Option<&[&str]>)] = &[
    ("llama.3.1", BotVariant::Llama, Some(&["8b", "70b", "405b"])),
    ("llama.3.3", BotVariant::Llama, Some(&["70b"])),
    ("llama.3.2", BotVariant::Deterministic, None),
];

/// Pick the variant for a model identifier.
///
/// Unknown local models fall back to [`BotVariant::Deterministic`].
pub fn classify(model: &str) -> BotVariant {
    let lower = model.to_lowercase();

    for (variant, patterns) in HOSTED_PATTERNS {
        let hit = patterns.iter().any(|(pattern, prefix)| {
            if *prefix {
                lower.starts_with(pattern)
            } else {
                lower.contains(pattern)
            }
        });
        if hit {
            return *variant;
        }
    }

    let dotted = lower.replace('-', ".");
    for (family, variant, sizes) in LOCAL_PATTERNS {
        if dotted.contains(family) && sizes.is_none_or(|s| s.iter().any(|size| dotted.contains(size))) {
            return *variant;
        }
    }

    BotVariant::Deterministic
}

/// Build a bot for `model`.
///
/// The API key comes from `api_key`, falling back to the provider's
/// configured key. Hosted variants without a key still get a bot; its
/// `chat` reports the missing key instead of calling the backend.
pub fn create_bot(
    model: &str,
    api_key: Option<String>,
    executor: Option<Arc<dyn ToolExecutor>>,
    config: &AppConfig,
) -> Result<Bot, Error> {
    let executor = executor.ok_or_else(|| Error::config("a tool executor is required to create a bot"))?;

    let variant = classify(model);
    let api_key = api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| config.api_key_for(variant.config_key()));
    info!(model = %model, variant = %variant, "Creating bot");

    let settings = BotSettings::from_config(variant, config);
    let mut bot = Bot::new(variant, model, api_key.clone(), executor).with_settings(settings);
    if let Some(backend) = build_backend(variant, api_key, config) {
        bot = bot.with_backend(backend);
    }
    Ok(bot)
}

fn build_backend(variant: BotVariant, api_key: Option<String>, config: &AppConfig) -> Option<Arc<dyn ChatBackend>> {
    let timeout = Duration::from_secs(config.backend_timeout_secs);
    let api_url = config
        .provider(variant.config_key())
        .and_then(|p| p.api_url.as_deref());

    let backend: Arc<dyn ChatBackend> = match variant {
        BotVariant::Anthropic => {
            let mut b = AnthropicBackend::new(api_key?).with_timeout(timeout);
            if let Some(url) = api_url {
                b = b.with_base_url(url);
            }
            Arc::new(b)
        }
        BotVariant::OpenAi => {
            let mut b = OpenAiCompatBackend::openai(api_key?).with_timeout(timeout);
            if let Some(url) = api_url {
                b = b.with_base_url(url);
            }
            Arc::new(b)
        }
        BotVariant::Google => {
            let mut b = GeminiBackend::new(api_key?).with_timeout(timeout);
            if let Some(url) = api_url {
                b = b.with_base_url(url);
            }
            Arc::new(b)
        }
        BotVariant::Llama => Arc::new(OpenAiCompatBackend::llama_stack(api_url, api_key).with_timeout(timeout)),
        BotVariant::Deterministic => return None,
    };
    Some(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingExecutor;
    use kubesage_config::ProviderConfig;

    #[test]
    fn routing_table() {
        let cases = [
            ("anthropic/claude-3-5-haiku", BotVariant::Anthropic),
            ("claude-sonnet-4", BotVariant::Anthropic),
            ("openai/gpt-4o-mini", BotVariant::OpenAi),
            ("gpt-4o", BotVariant::OpenAi),
            ("o1-mini", BotVariant::OpenAi),
            ("google/gemini-2.5-flash", BotVariant::Google),
            ("gemini-1.5-pro", BotVariant::Google),
            ("meta-llama/Llama-3.2-3B-Instruct", BotVariant::Deterministic),
            ("meta-llama/Llama-3.1-8B-Instruct", BotVariant::Llama),
            ("meta-llama/Llama-3.1-70B-Instruct", BotVariant::Llama),
            ("meta-llama/Llama-3.3-70B-Instruct", BotVariant::Llama),
            ("meta-llama/Llama-3.1-405B-Instruct", BotVariant::Llama),
            ("meta-llama/Llama-3.1-1B-Instruct", BotVariant::Deterministic),
            ("meta-llama/Llama-3.3-8B-Instruct", BotVariant::Deterministic),
            ("mistral-7b-instruct", BotVariant::Deterministic),
        ];
        for (model, expected) in cases {
            assert_eq!(classify(model), expected, "{model}");
        }
    }

    #[test]
    fn gpt_marker_must_be_a_prefix() {
        assert_eq!(classify("my-gpt-clone"), BotVariant::Deterministic);
    }

    #[test]
    fn executor_is_required() {
        let err = create_bot("gpt-4o", None, None, &AppConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn key_falls_back_to_config() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "anthropic".into(),
            ProviderConfig {
                api_key: Some("sk-ant-config".into()),
                ..Default::default()
            },
        );
        let executor: Arc<dyn ToolExecutor> = Arc::new(RecordingExecutor::empty());

        let bot = create_bot("anthropic/claude-3-5-haiku", None, Some(executor.clone()), &config).unwrap();
        assert_eq!(bot.api_key(), Some("sk-ant-config"));

        let explicit = create_bot("anthropic/claude-3-5-haiku", Some("sk-ant-arg".into()), Some(executor), &config).unwrap();
        assert_eq!(explicit.api_key(), Some("sk-ant-arg"));
    }

    #[test]
    fn settings_follow_variant() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(RecordingExecutor::empty());
        let bot = create_bot("google/gemini-2.5-flash", Some("g".into()), Some(executor), &AppConfig::default()).unwrap();
        assert_eq!(bot.variant(), BotVariant::Google);
        assert_eq!(bot.settings().max_iterations, 10);
        assert_eq!(bot.model_identifier(), "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn hosted_bot_without_key_reports_it() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(RecordingExecutor::with_promql());
        let bot = create_bot("openai/gpt-4o-mini", None, Some(executor), &AppConfig::default()).unwrap();
        assert_eq!(
            bot.chat("How many pods?", None, None).await,
            "API key required for OpenAI model openai/gpt-4o-mini. Please provide an API key."
        );
    }
}
