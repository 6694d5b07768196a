//! Prometheus / Thanos query tools.
//!
//! `execute_promql` runs an instant query and `get_label_values` lists the
//! values of one label. Both talk to the Prometheus HTTP API and return
//! compact JSON text for the model to read.

use async_trait::async_trait;
use kubesage_config::PrometheusConfig;
use kubesage_core::error::ToolError;
use kubesage_core::tool::ToolHandler;
use serde::Deserialize;
use regex_lite::Regex;
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

use crate::http;

const SERVICE: &str = "Prometheus";

/// Prometheus label-name syntax. Anything else would change the request path.
static LABEL_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Thin client for the Prometheus HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: http::build_client(Duration::from_secs(30)),
        }
    }

    pub fn from_config(config: &PrometheusConfig) -> Self {
        Self::new(config.url.clone(), config.resolved_token())
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self
    }

    /// Run an instant query and return the `data` section.
    pub async fn query(&self, promql: &str) -> Result<QueryData, ToolError> {
        let body: ApiEnvelope<QueryData> = self.get("/api/v1/query", &[("query", promql)]).await?;
        body.into_data()
    }

    /// All values seen for `label`.
    pub async fn label_values(&self, label: &str) -> Result<Vec<String>, ToolError> {
        if !LABEL_NAME.is_match(label) {
            return Err(ToolError::InvalidArguments(format!("invalid label name '{label}'")));
        }
        let path = format!("/api/v1/label/{label}/values");
        let body: ApiEnvelope<Vec<String>> = self.get(&path, &[]).await?;
        body.into_data()
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ToolError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Prometheus request");

        let mut request = self.client.get(&url).query(params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| http::unavailable(SERVICE, e))?;
        let response = http::check_status(response, SERVICE).await?;
        http::parse_json(response, SERVICE).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, ToolError> {
        match (self.status.as_str(), self.data) {
            ("success", Some(data)) => Ok(data),
            _ => Err(ToolError::Unavailable {
                service: SERVICE.into(),
                reason: self.error.unwrap_or_else(|| format!("query status {}", self.status)),
            }),
        }
    }
}

/// The `data` section of an instant-query response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    pub result_type: String,
    #[serde(default)]
    pub result: Value,
}

impl QueryData {
    /// Series as `{metric, value}` objects; scalars and strings become one entry.
    fn series(&self) -> Vec<Value> {
        if matches!(self.result_type.as_str(), "scalar" | "string") {
            return vec![json!({"metric": {}, "value": self.result})];
        }
        match &self.result {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    let mut entry = Map::new();
                    entry.insert("metric".into(), item.get("metric").cloned().unwrap_or_else(|| json!({})));
                    if let Some(value) = item.get("value") {
                        entry.insert("value".into(), value.clone());
                    }
                    if let Some(values) = item.get("values") {
                        entry.insert("values".into(), values.clone());
                    }
                    Value::Object(entry)
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Render a query result the way the tools hand it to the model.
pub fn render_query(query: &str, data: &QueryData) -> Value {
    let results = data.series();
    let mut out = json!({
        "status": "success",
        "query": query,
        "result_type": data.result_type,
        "results": results,
    });
    if results.is_empty() {
        out["message"] = json!("Query returned no data");
    }
    out
}

fn required_str<'a>(tool: &str, arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("{tool}: missing '{key}' argument")))
}

/// Execute a PromQL query.
pub struct ExecutePromqlTool {
    client: Arc<PrometheusClient>,
}

impl ExecutePromqlTool {
    pub fn new(client: Arc<PrometheusClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for ExecutePromqlTool {
    fn name(&self) -> &str {
        "execute_promql"
    }

    fn description(&self) -> &str {
        "Execute a PromQL instant query against the cluster's Prometheus/Thanos and return \
         the matching series. Use for metrics, resource usage, and alerts \
         (e.g. ALERTS{alertstate=\"firing\"})."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The PromQL expression to evaluate"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let query = required_str(self.name(), arguments, "query")?;
        let data = self.client.query(query).await?;
        Ok(render_query(query, &data).to_string())
    }
}

/// List the values of a label.
pub struct GetLabelValuesTool {
    client: Arc<PrometheusClient>,
}

impl GetLabelValuesTool {
    pub fn new(client: Arc<PrometheusClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for GetLabelValuesTool {
    fn name(&self) -> &str {
        "get_label_values"
    }

    fn description(&self) -> &str {
        "List every value Prometheus has seen for a label, such as namespace, pod, or alertname. \
         Use it to discover valid filters before writing a query."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {
                    "type": "string",
                    "description": "Label name, e.g. \"namespace\""
                }
            },
            "required": ["label"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let label = required_str(self.name(), arguments, "label")?;
        let values = self.client.label_values(label).await?;
        Ok(json!({
            "label": label,
            "count": values.len(),
            "values": values,
        })
        .to_string())
    }
}
