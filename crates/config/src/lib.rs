//! Configuration loading, validation, and management for KubeSage.
//!
//! Loads configuration from `~/.kubesage/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.kubesage/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used when the CLI is not given one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature for tool-calling backends
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on transcript length during a chat
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Request timeout for model backends, in seconds
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,

    /// Metrics backend
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Correlation backend
    #[serde(default)]
    pub korrel8r: Korrel8rConfig,

    /// Remote tool server
    #[serde(default)]
    pub mcp: McpConfig,

    /// Per-provider settings, keyed by "anthropic", "openai", "google", "llama"
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_model() -> String {
    "meta-llama/Llama-3.1-8B-Instruct".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_history_cap() -> usize {
    10
}
fn default_backend_timeout() -> u64 {
    300
}
fn default_service_timeout() -> u64 {
    30
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("history_cap", &self.history_cap)
            .field("backend_timeout_secs", &self.backend_timeout_secs)
            .field("prometheus", &self.prometheus)
            .field("korrel8r", &self.korrel8r)
            .field("mcp", &self.mcp)
            .field("providers", &self.providers)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_url")]
    pub url: String,

    /// Bearer token, or a path to a file containing one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".into()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: default_prometheus_url(),
            token: None,
            timeout_secs: default_service_timeout(),
        }
    }
}

impl std::fmt::Debug for PrometheusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusConfig")
            .field("url", &self.url)
            .field("token", &redact(&self.token))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PrometheusConfig {
    /// Resolve the bearer token. A value naming a readable file is replaced
    /// by that file's trimmed contents (the in-cluster service-account case).
    pub fn resolved_token(&self) -> Option<String> {
        let raw = self.token.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        let path = Path::new(raw);
        if path.is_file() {
            match std::fs::read_to_string(path) {
                Ok(contents) => return Some(contents.trim().to_string()),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to read token file"),
            }
        }
        Some(raw.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Korrel8rConfig {
    /// Base URL; correlation tools are only offered when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

impl Default for Korrel8rConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_service_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    /// MCP endpoint; when set, tools are executed remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_result_length: Option<usize>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("max_iterations", &self.max_iterations)
            .field("max_tool_result_length", &self.max_tool_result_length)
            .finish()
    }
}

/// Environment variables that supply each provider's API key.
const PROVIDER_KEY_VARS: &[(&str, &str)] = &[
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("google", "GOOGLE_API_KEY"),
    ("llama", "LLM_API_TOKEN"),
];

impl AppConfig {
    /// Load configuration from the default path (~/.kubesage/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `GOOGLE_API_KEY`, `LLM_API_TOKEN`
    /// - `LLAMA_STACK_URL`, `PROMETHEUS_URL`, `THANOS_TOKEN`, `KORREL8R_URL`, `MCP_SERVER_URL`
    /// - `KUBESAGE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (provider, var) in PROVIDER_KEY_VARS {
            if let Some(key) = lookup(var).filter(|k| !k.is_empty()) {
                self.providers.entry((*provider).to_string()).or_default().api_key = Some(key);
            }
        }
        if let Some(url) = lookup("LLAMA_STACK_URL") {
            self.providers.entry("llama".into()).or_default().api_url = Some(url);
        }
        if let Some(url) = lookup("PROMETHEUS_URL") {
            self.prometheus.url = url;
        }
        if let Some(token) = lookup("THANOS_TOKEN") {
            self.prometheus.token = Some(token);
        }
        if let Some(url) = lookup("KORREL8R_URL").filter(|u| !u.is_empty()) {
            self.korrel8r.url = Some(url);
        }
        if let Some(url) = lookup("MCP_SERVER_URL").filter(|u| !u.is_empty()) {
            self.mcp.url = Some(url);
        }
        if let Some(model) = lookup("KUBESAGE_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".kubesage")
    }

    /// Settings for one provider, if configured.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// The configured API key for a provider.
    pub fn api_key_for(&self, name: &str) -> Option<String> {
        self.provider(name).and_then(|p| p.api_key.clone())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.history_cap < 4 {
            return Err(ConfigError::ValidationError(
                "history_cap must be at least 4".into(),
            ));
        }
        for (name, provider) in &self.providers {
            if provider.max_iterations == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{name}.max_iterations must be > 0"
                )));
            }
            if provider.max_tool_result_length == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{name}.max_tool_result_length must be > 0"
                )));
            }
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_cap: default_history_cap(),
            backend_timeout_secs: default_backend_timeout(),
            prometheus: PrometheusConfig::default(),
            korrel8r: Korrel8rConfig::default(),
            mcp: McpConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history_cap, 10);
        assert_eq!(config.prometheus.url, "http://localhost:9090");
        assert!(config.korrel8r.url.is_none());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.history_cap, config.history_cap);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_history_cap_rejected() {
        let config = AppConfig {
            history_cap: 2,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iteration_cap_rejected() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "google".into(),
            ProviderConfig {
                max_iterations: Some(0),
                ..ProviderConfig::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("providers.google.max_iterations"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_model, "meta-llama/Llama-3.1-8B-Instruct");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_model = "anthropic/claude-3-5-haiku"
history_cap = 8

[prometheus]
url = "https://thanos.example:9091"

[korrel8r]
url = "https://korrel8r.example"

[providers.google]
max_iterations = 5
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "anthropic/claude-3-5-haiku");
        assert_eq!(config.history_cap, 8);
        assert_eq!(config.prometheus.url, "https://thanos.example:9091");
        assert_eq!(config.korrel8r.url.as_deref(), Some("https://korrel8r.example"));
        assert_eq!(config.provider("google").unwrap().max_iterations, Some(5));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "history_cap = \"ten\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("LLAMA_STACK_URL", "http://llamastack:8321/v1/openai/v1"),
            ("PROMETHEUS_URL", "http://prom:9090"),
            ("KORREL8R_URL", "http://korrel8r:8080"),
            ("KUBESAGE_MODEL", "openai/gpt-4o-mini"),
        ]));
        assert_eq!(config.api_key_for("anthropic").as_deref(), Some("sk-ant-test"));
        assert!(config.api_key_for("openai").is_none());
        assert_eq!(
            config.provider("llama").unwrap().api_url.as_deref(),
            Some("http://llamastack:8321/v1/openai/v1")
        );
        assert_eq!(config.prometheus.url, "http://prom:9090");
        assert_eq!(config.korrel8r.url.as_deref(), Some("http://korrel8r:8080"));
        assert_eq!(config.default_model, "openai/gpt-4o-mini");
    }

    #[test]
    fn empty_env_key_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("OPENAI_API_KEY", "")]));
        assert!(config.api_key_for("openai").is_none());
    }

    #[test]
    fn token_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  secret-token  ").unwrap();
        let prom = PrometheusConfig {
            token: Some(file.path().display().to_string()),
            ..PrometheusConfig::default()
        };
        assert_eq!(prom.resolved_token().as_deref(), Some("secret-token"));

        let literal = PrometheusConfig {
            token: Some("literal-token".into()),
            ..PrometheusConfig::default()
        };
        assert_eq!(literal.resolved_token().as_deref(), Some("literal-token"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("OPENAI_API_KEY", "sk-very-secret"), ("THANOS_TOKEN", "tok")]));
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("\"tok\""));
        assert!(debug.contains("[REDACTED]"));
    }
}
