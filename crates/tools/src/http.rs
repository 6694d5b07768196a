//! HTTP plumbing shared by the service clients.

use kubesage_core::error::ToolError;
use std::time::Duration;
use tracing::warn;

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build HTTP client, falling back to defaults");
            reqwest::Client::new()
        })
}

/// A transport failure talking to `service`.
pub(crate) fn unavailable(service: &str, e: reqwest::Error) -> ToolError {
    warn!(service, error = %e, "Request failed");
    ToolError::Unavailable {
        service: service.into(),
        reason: e.to_string(),
    }
}

/// Any non-2xx status is reported as the service being unavailable.
pub(crate) async fn check_status(
    response: reqwest::Response,
    service: &str,
) -> Result<reqwest::Response, ToolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(service, status = status.as_u16(), body = %body, "Service returned error");
    Err(ToolError::Unavailable {
        service: service.into(),
        reason: format!("HTTP {}: {}", status.as_u16(), body),
    })
}

pub(crate) async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    service: &str,
) -> Result<T, ToolError> {
    response
        .json()
        .await
        .map_err(|e| ToolError::Protocol(format!("Failed to parse {service} response: {e}")))
}
