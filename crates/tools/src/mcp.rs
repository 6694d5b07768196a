//! Remote tool executor speaking MCP (JSON-RPC 2.0) over HTTP.
//!
//! The server may answer a request with a plain JSON body or with a
//! `text/event-stream` body whose `data:` lines carry the JSON-RPC message.
//! The session is initialized lazily on first use, and the tool list is
//! fetched once and cached.

use async_trait::async_trait;
use kubesage_core::error::ToolError;
use kubesage_core::tool::{Tool, ToolExecutor};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::http;

const SERVICE: &str = "MCP server";
const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";

/// JSON-RPC client for an MCP server reachable over HTTP.
pub struct McpExecutor {
    url: String,
    token: Option<String>,
    client: reqwest::Client,
    next_id: AtomicU64,
    session: OnceCell<Option<String>>,
    tools: OnceCell<Vec<Tool>>,
}

impl McpExecutor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            client: http::build_client(Duration::from_secs(120)),
            next_id: AtomicU64::new(1),
            session: OnceCell::new(),
            tools: OnceCell::new(),
        }
    }

    /// Send a bearer token with every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self
    }

    fn request(&self, session: Option<&str>, body: &Value) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(body);
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Run the handshake once and remember the session id, if any.
    async fn session(&self) -> Result<Option<&str>, ToolError> {
        let session = self
            .session
            .get_or_try_init(|| async {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let body = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": "initialize",
                    "params": {
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {},
                        "clientInfo": {"name": "kubesage", "version": env!("CARGO_PKG_VERSION")}
                    }
                });

                let response = self
                    .request(None, &body)
                    .send()
                    .await
                    .map_err(|e| http::unavailable(SERVICE, e))?;
                let response = http::check_status(response, SERVICE).await?;
                let session = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let message = read_message(response, id).await?;
                rpc_result("initialize", message)?;

                let notification = json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/initialized",
                });
                let response = self
                    .request(session.as_deref(), &notification)
                    .send()
                    .await
                    .map_err(|e| http::unavailable(SERVICE, e))?;
                http::check_status(response, SERVICE).await?;

                debug!(url = %self.url, session = ?session, "MCP session initialized");
                Ok::<_, ToolError>(session)
            })
            .await?;
        Ok(session.as_deref())
    }

    /// Send one JSON-RPC request and return its `result`.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        let session = self.session().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .request(session, &body)
            .send()
            .await
            .map_err(|e| http::unavailable(SERVICE, e))?;
        let response = http::check_status(response, SERVICE).await?;
        let message = read_message(response, id).await?;
        rpc_result(method, message)
    }
}

/// Read the JSON-RPC reply with the given id from a JSON or SSE body.
async fn read_message(response: reqwest::Response, id: u64) -> Result<Value, ToolError> {
    let is_stream = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));

    let text = response
        .text()
        .await
        .map_err(|e| http::unavailable(SERVICE, e))?;

    if is_stream {
        parse_event_stream(&text, id)
    } else {
        serde_json::from_str(&text).map_err(|e| ToolError::Protocol(format!("Invalid JSON-RPC reply: {e}")))
    }
}

/// Pick the reply for `id` out of an event stream.
///
/// Multi-line `data:` fields are joined per event; events are separated by a
/// blank line. Messages for other ids (server notifications) are skipped.
pub(crate) fn parse_event_stream(text: &str, id: u64) -> Result<Value, ToolError> {
    let mut events: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !current.is_empty() {
                events.push(current.join("\n"));
                current.clear();
            }
        } else if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        events.push(current.join("\n"));
    }

    events
        .iter()
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
        .find(|msg| msg.get("id").and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| ToolError::Protocol(format!("No reply for request {id} in event stream")))
}

fn rpc_result(method: &str, mut message: Value) -> Result<Value, ToolError> {
    if let Some(error) = message.get("error") {
        let detail = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(ToolError::Protocol(format!("{method}: {detail}")));
    }
    match message.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(ToolError::Protocol(format!("{method}: reply has no result"))),
    }
}

/// Join the text items of a `tools/call` result.
fn result_text(result: &Value) -> String {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect();

    if texts.is_empty() {
        if let Some(structured) = result.get("structuredContent") {
            return structured.to_string();
        }
    }
    texts.join("\n")
}

#[async_trait]
impl ToolExecutor for McpExecutor {
    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        let tools = self
            .tools
            .get_or_try_init(|| async {
                let result = self.rpc("tools/list", json!({})).await?;
                let tools: Vec<Tool> = serde_json::from_value(result.get("tools").cloned().unwrap_or(json!([])))
                    .map_err(|e| ToolError::Protocol(format!("Invalid tool list: {e}")))?;
                debug!(count = tools.len(), "MCP tools listed");
                Ok::<_, ToolError>(tools)
            })
            .await?;
        Ok(tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let result = self
            .rpc("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;
        let text = result_text(&result);

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            warn!(tool = %name, "MCP tool reported an error");
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: text,
            });
        }
        Ok(text)
    }
}
