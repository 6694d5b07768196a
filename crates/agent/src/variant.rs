//! The closed set of bot variants and their per-provider settings.

use serde::{Deserialize, Serialize};

/// Which backend a bot talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotVariant {
    Anthropic,
    OpenAi,
    Google,
    /// Local Llama Stack over its OpenAI-compatible endpoint.
    Llama,
    /// Keyword matching, no model in the loop.
    Deterministic,
}

impl BotVariant {
    /// Key used for `[providers.<key>]` config sections.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Llama => "llama",
            Self::Deterministic => "deterministic",
        }
    }

    /// Name shown to users.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Anthropic => "Anthropic",
            Self::OpenAi => "OpenAI",
            Self::Google => "Google",
            Self::Llama => "Llama",
            Self::Deterministic => "Deterministic",
        }
    }

    /// Environment variable holding the API key, for hosted variants.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Google => Some("GOOGLE_API_KEY"),
            Self::Llama | Self::Deterministic => None,
        }
    }

    /// Whether chatting requires an API key.
    pub fn requires_api_key(self) -> bool {
        self.api_key_env().is_some()
    }

    /// The model name the backend expects.
    ///
    /// Hosted backends want the bare name, so a `provider/` prefix is
    /// dropped. Llama Stack routes on the full identifier and keeps it.
    pub fn extract_model_identifier(self, model: &str) -> String {
        match self {
            Self::Llama => model.to_string(),
            _ => model
                .split_once('/')
                .map_or(model, |(_, name)| name)
                .to_string(),
        }
    }

    /// Default character budget for one tool result.
    pub fn max_tool_result_length(self) -> usize {
        match self {
            Self::Anthropic => 15_000,
            Self::OpenAi | Self::Google => 10_000,
            Self::Llama => 8_000,
            Self::Deterministic => 5_000,
        }
    }

    /// Default iteration cap for the tool-calling loop.
    pub fn max_iterations(self) -> u32 {
        match self {
            Self::Google => 10,
            _ => 30,
        }
    }

    /// Provider-tuned guidance appended to the system prompt.
    pub fn addendum(self) -> &'static str {
        match self {
            Self::Anthropic => ANTHROPIC_ADDENDUM,
            Self::OpenAi => OPENAI_ADDENDUM,
            Self::Google => GOOGLE_ADDENDUM,
            Self::Llama => LLAMA_ADDENDUM,
            Self::Deterministic => "",
        }
    }
}

impl std::fmt::Display for BotVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

const ANTHROPIC_ADDENDUM: &str = r#"---

**CLAUDE-SPECIFIC INSTRUCTIONS:**
- You may request several tools in one turn when the queries are independent.
- Keep the analysis tight: one clear summary, then the supporting numbers.
- Quote label values exactly as returned; do not guess namespace or pod names."#;

const OPENAI_ADDENDUM: &str = r#"---

**GPT-SPECIFIC INSTRUCTIONS:**
- Call tools through the function API, one clear query per call.
- Group resource queries by pod and namespace for detailed breakdowns.
- Balance completeness with brevity."#;

const GOOGLE_ADDENDUM: &str = r#"---

**GEMINI-SPECIFIC INSTRUCTIONS:**
- Tool results come back as function responses; read them before answering.
- You have a limited number of tool rounds, so prefer one precise query over several broad ones.
- Do not repeat a query that already returned data."#;

const LLAMA_ADDENDUM: &str = r#"---

**LLAMA-SPECIFIC INSTRUCTIONS:**

**Tool Calling Format:**
- Use the provided tools through the function calling mechanism.
- Never write tool calls as JSON text such as {"name": "tool_name", "parameters": {...}}.

**PromQL Patterns That Work:**
- CPU: sum(rate(container_cpu_usage_seconds_total[5m])) by (pod, namespace)
- Memory: sum(container_memory_usage_bytes) by (pod, namespace)
- GPU utilization: avg(DCGM_FI_DEV_GPU_UTIL) or avg(habanalabs_utilization)
- Pod status: kube_pod_status_phase == 1, with a namespace filter"#;
