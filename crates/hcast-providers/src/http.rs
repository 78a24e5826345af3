//! Shared HTTP plumbing for backend clients.

use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::error::{snippet, ProviderError, ProviderResult};

/// Timeout for artifact downloads, which dwarf the API calls.
pub(crate) const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Build a client with a per-request timeout for API calls.
pub fn build_client(timeout: Duration) -> ProviderResult<Client> {
    Client::builder().timeout(timeout).build().map_err(Into::into)
}

/// Classify a non-success HTTP status into the provider taxonomy.
///
/// 409/429 are concurrency/rate gates, other 4xx are rejections, 5xx are
/// upstream transients.
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = snippet(body.trim());
    if status == StatusCode::CONFLICT || status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::rate_limited(format!("{status}: {message}"))
    } else if status.is_server_error() {
        ProviderError::upstream(format!("{status}: {message}"))
    } else {
        ProviderError::rejected(Some(status.as_u16()), message)
    }
}

/// Resolve a response to itself on success, or a classified error.
pub async fn check_response(resp: Response) -> ProviderResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// Parse a success response as JSON.
pub async fn json_body(resp: Response) -> ProviderResult<serde_json::Value> {
    let resp = check_response(resp).await?;
    Ok(resp.json().await?)
}

/// Download an artifact reference to a local path.
///
/// Accepts plain http(s) URLs and inline `data:` URIs (base64 payloads some
/// backends return instead of hosting the file).
pub async fn download_to(client: &Client, reference: &str, out: &Path) -> ProviderResult<()> {
    if let Some(parent) = out.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if let Some(rest) = reference.strip_prefix("data:") {
        let encoded = rest
            .split_once("base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| {
                ProviderError::invalid_input("data URI without base64 payload".to_string())
            })?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::invalid_input(format!("undecodable data URI: {e}")))?;
        tokio::fs::write(out, bytes).await?;
        return Ok(());
    }

    debug!("Downloading artifact from {}", reference);
    let resp = client
        .get(reference)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await?;
    let resp = check_response(resp).await?;
    let bytes = resp.bytes().await?;
    tokio::fs::write(out, &bytes).await?;
    Ok(())
}

/// Basic-auth header value from an API key with empty password.
pub fn basic_auth_value(api_key: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{api_key}:"));
    format!("Basic {encoded}")
}
