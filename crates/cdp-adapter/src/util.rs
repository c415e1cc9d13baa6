use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::error::{AdapterError, AdapterErrorKind};

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: Option<String>,
}

/// Parse an endpoint, defaulting to `http://` when no scheme was given.
pub fn parse_endpoint(endpoint: &str) -> Result<Url, AdapterError> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("endpoint is empty"));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    Url::parse(&candidate).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("invalid endpoint '{trimmed}': {err}"))
    })
}

/// Resolve a debugging endpoint to the browser websocket URL.
///
/// `ws://`/`wss://` endpoints are returned unchanged; `http(s)://host:port` endpoints are
/// resolved through `GET /json/version`.
pub async fn resolve_ws_url(endpoint: &str, timeout: Duration) -> Result<String, AdapterError> {
    let url = parse_endpoint(endpoint)?;
    match url.scheme() {
        "ws" | "wss" => return Ok(url.to_string()),
        "http" | "https" => {}
        other => {
            return Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("unsupported endpoint scheme '{other}'")))
        }
    }

    let version_url = url.join("/json/version").map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string())
    })?;

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("failed to build HTTP client: {err}"))
        })?;

    let response = client.get(version_url.clone()).send().await.map_err(|err| {
        AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("debugging endpoint unreachable: {err}"))
            .with_data(json!({
                "endpoint": endpoint,
                "hint": "Start Chrome with --remote-debugging-port=9222 or pass the websocket URL directly."
            }))
            .retriable(true)
    })?;

    if !response.status().is_success() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint(format!(
            "{} returned {}",
            version_url,
            response.status()
        )));
    }

    let info: VersionInfo = response.json().await.map_err(|err| {
        AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("invalid /json/version payload: {err}"))
    })?;

    info.web_socket_debugger_url
        .filter(|ws| !ws.trim().is_empty())
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint("/json/version did not expose webSocketDebuggerUrl")
        })
}
