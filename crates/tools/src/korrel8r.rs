//! Korrel8r correlation tools.
//!
//! Korrel8r links signals across domains (alerts, pods, logs, traces).
//! `korrel8r_query_objects` runs one domain query; `korrel8r_get_correlated`
//! asks Korrel8r which goal queries relate to a start query and runs them.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use kubesage_config::Korrel8rConfig;
use kubesage_core::error::ToolError;
use kubesage_core::tool::ToolHandler;
use regex_lite::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::http;

const SERVICE: &str = "Korrel8r";

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

static LOG_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\b(INFO|ERROR|WARN|WARNING|DEBUG|TRACE|CRITICAL|FATAL)\b\s*:?[\t ]*(.*)$").unwrap()
});

/// REST client for Korrel8r.
#[derive(Debug, Clone)]
pub struct Korrel8rClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl Korrel8rClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: http::build_client(Duration::from_secs(30)),
        }
    }

    /// Build from config; `None` when no URL is configured.
    pub fn from_config(config: &Korrel8rConfig, token: Option<String>) -> Option<Self> {
        let url = config.url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        Some(Self::new(url, token).with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self
    }

    /// `GET /api/v1alpha1/objects?query=...`, with log objects simplified.
    pub async fn query_objects(&self, query: &str) -> Result<Value, ToolError> {
        if query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must be a non-empty string".into()));
        }

        let url = format!("{}/api/v1alpha1/objects", self.base_url);
        let mut request = self.client.get(&url).query(&[("query", query)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| http::unavailable(SERVICE, e))?;
        let response = http::check_status(response, SERVICE).await?;
        let result: Value = http::parse_json(response, SERVICE).await?;

        Ok(match simplify_logs(&result) {
            Some(entries) => json!(entries),
            None => result,
        })
    }

    /// `POST /api/v1alpha1/lists/goals`.
    pub async fn list_goals(&self, goals: &[String], query: &str) -> Result<Value, ToolError> {
        let url = format!("{}/api/v1alpha1/lists/goals", self.base_url);
        let payload = json!({
            "goals": goals,
            "start": {"queries": [query]},
        });

        let mut request = self.client.post(&url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| http::unavailable(SERVICE, e))?;
        let response = http::check_status(response, SERVICE).await?;
        http::parse_json(response, SERVICE).await
    }

    /// Resolve goal queries for `query` and aggregate the objects each returns.
    ///
    /// A failing goal query is logged and skipped.
    pub async fn correlated_objects(&self, goals: &[String], query: &str) -> Result<Vec<Value>, ToolError> {
        let listed = self.list_goals(goals, query).await?;

        let goal_queries: Vec<String> = listed
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| item.get("queries").and_then(Value::as_array))
            .flatten()
            .filter_map(|q| q.get("query").and_then(Value::as_str))
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();

        debug!(goals = ?goals, count = goal_queries.len(), "Korrel8r goal queries resolved");

        let mut aggregated = Vec::new();
        for goal_query in goal_queries {
            match self.query_objects(&goal_query).await {
                Ok(Value::Array(items)) => aggregated.extend(items),
                Ok(Value::Object(mut obj)) => {
                    if let Some(Value::Array(items)) = obj.remove("data") {
                        aggregated.extend(items);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(query = %goal_query, error = %e, "Correlated query failed, skipping"),
            }
        }
        Ok(aggregated)
    }
}

/// One log line reduced to what the model needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub namespace: String,
    pub pod: String,
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

fn first_field<'a>(item: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .find(|v| !v.is_null() && v.as_str() != Some(""))
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Parse a log timestamp, tolerating more than nanosecond precision.
fn parse_timestamp(ts: &str) -> Option<DateTime<FixedOffset>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt);
    }
    // Trim fractional digits beyond nine and retry.
    let (head, tail) = ts.split_once('.')?;
    let split = tail
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(tail.len(), |(i, _)| i);
    let (digits, zone) = tail.split_at(split);
    let digits: String = digits.chars().take(9).collect();
    DateTime::parse_from_rfc3339(&format!("{head}.{digits}{zone}")).ok()
}

/// Simplify log-shaped Korrel8r objects.
///
/// Returns `None` when the input is not a list containing log objects.
/// Duplicates by (namespace, pod, level, message) collapse to the latest
/// timestamp, keeping first-seen order.
pub fn simplify_logs(objects: &Value) -> Option<Vec<LogEntry>> {
    let items = objects.as_array()?;

    let mut entries: Vec<LogEntry> = Vec::new();
    let mut index: HashMap<(String, String, String, String), usize> = HashMap::new();
    let mut found_log_shape = false;

    for item in items.iter().filter_map(Value::as_object) {
        let Some(body) = first_field(item, &["body", "message", "log"]) else {
            continue;
        };
        found_log_shape = true;

        let text = field_text(Some(body));
        let text = ANSI_ESCAPE.replace_all(&text, "").trim().to_string();

        let (level, message) = match LOG_LEVEL.captures(&text) {
            Some(caps) => {
                let level = caps.get(1).map_or("UNKNOWN", |m| m.as_str()).to_uppercase();
                let tail = caps.get(2).map_or("", |m| m.as_str().trim());
                let message = if tail.is_empty() { text.clone() } else { tail.to_string() };
                (level, message)
            }
            None => ("UNKNOWN".to_string(), text.clone()),
        };

        let entry = LogEntry {
            namespace: field_text(first_field(
                item,
                &["k8s_namespace_name", "kubernetes_namespace_name", "namespace"],
            )),
            pod: field_text(first_field(item, &["k8s_pod_name", "kubernetes_pod_name", "pod"])),
            level,
            message,
            timestamp: field_text(first_field(
                item,
                &["_timestamp", "timestamp", "@timestamp", "time", "ts"],
            )),
        };

        let key = (
            entry.namespace.clone(),
            entry.pod.clone(),
            entry.level.clone(),
            entry.message.clone(),
        );
        match index.get(&key) {
            None => {
                index.insert(key, entries.len());
                entries.push(entry);
            }
            Some(&i) => {
                if is_newer(&entry.timestamp, &entries[i].timestamp) {
                    entries[i] = entry;
                }
            }
        }
    }

    found_log_shape.then_some(entries)
}

fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_timestamp(candidate), parse_timestamp(current)) {
        (Some(new), Some(old)) => new >= old,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => candidate > current,
    }
}

fn query_arg(tool: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
    arguments
        .get("query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidArguments(format!("{tool}: provide a Korrel8r domain query string")))
}

/// Run one Korrel8r domain query.
pub struct QueryObjectsTool {
    client: Arc<Korrel8rClient>,
}

impl QueryObjectsTool {
    pub fn new(client: Arc<Korrel8rClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for QueryObjectsTool {
    fn name(&self) -> &str {
        "korrel8r_query_objects"
    }

    fn description(&self) -> &str {
        "Execute a Korrel8r domain query and return the matching objects. Query format is \
         domain:class:selector, e.g. alert:alert:{\"alertname\":\"KubePodCrashLooping\"} or \
         k8s:Pod:{\"namespace\":\"ns\"}. Log results are simplified to namespace, pod, level, \
         message and timestamp."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Korrel8r domain query (domain:class:selector)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let query = query_arg(self.name(), arguments)?;
        let result = self.client.query_objects(&query).await?;
        Ok(result.to_string())
    }
}

/// Follow correlations from a start query to the requested goal domains.
pub struct GetCorrelatedTool {
    client: Arc<Korrel8rClient>,
}

impl GetCorrelatedTool {
    pub fn new(client: Arc<Korrel8rClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for GetCorrelatedTool {
    fn name(&self) -> &str {
        "korrel8r_get_correlated"
    }

    fn description(&self) -> &str {
        "Find objects correlated with a start query in the given goal domains, e.g. the logs \
         and pods related to a firing alert. Goals are Korrel8r class names such as \"log:application\" \
         or \"k8s:Pod\"."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goals": {
                    "type": "array",
                    "description": "Goal classes to correlate to",
                    "items": {"type": "string"}
                },
                "query": {
                    "type": "string",
                    "description": "Start query (domain:class:selector)"
                }
            },
            "required": ["goals", "query"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let query = query_arg(self.name(), arguments)?;
        let goals: Vec<String> = match arguments.get("goals") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|g| {
                    g.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ToolError::InvalidArguments("goals must be a list of strings".into()))
                })
                .collect::<Result<_, _>>()?,
            Some(Value::String(single)) => vec![single.clone()],
            _ => {
                return Err(ToolError::InvalidArguments(
                    "korrel8r_get_correlated: 'goals' is required".into(),
                ));
            }
        };

        let objects = self.client.correlated_objects(&goals, &query).await?;
        Ok(Value::Array(objects).to_string())
    }
}
