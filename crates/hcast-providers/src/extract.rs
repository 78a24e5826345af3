//! Artifact extraction from loosely-structured backend responses.
//!
//! Backends (and backend versions) nest the artifact reference under
//! different key paths. This module is the one place that knows the shapes;
//! new ones get added here, never in lifecycle or client code.
//!
//! Shapes are tried in a fixed order, first match wins:
//! 1. `video.url`
//! 2. `video` as a bare URL string
//! 3. `video_url`
//! 4. `url` as a bare URL string
//! 5. `output.video` / `output.video_url` / `output.url`
//! 6. `result.video` / `result.video_url` / `result.url`

use serde_json::Value;

use crate::error::{ProviderError, ProviderResult};

/// Keys probed inside nested `output`/`result` objects, in order.
const NESTED_KEYS: [&str; 3] = ["video", "video_url", "url"];

/// Locate the artifact reference in a final response payload.
///
/// Returns `None` when no known shape matches; callers treat that as a
/// contract violation, not a retry condition.
pub fn extract_artifact_url(payload: &Value) -> Option<&str> {
    let obj = payload.as_object()?;

    // 1-2: top-level `video`, as `{ "url": ... }` or a bare string
    if let Some(video) = obj.get("video") {
        if let Some(url) = video.get("url").and_then(Value::as_str) {
            return Some(url);
        }
        if let Some(url) = video.as_str().filter(|s| looks_like_ref(s)) {
            return Some(url);
        }
    }

    // 3: top-level `video_url`
    if let Some(url) = obj.get("video_url").and_then(Value::as_str) {
        return Some(url);
    }

    // 4: top-level `url`, bare string only
    if let Some(url) = obj.get("url").and_then(Value::as_str).filter(|s| looks_like_ref(s)) {
        return Some(url);
    }

    // 5-6: nested under `output` / `result`
    for container in ["output", "result"] {
        if let Some(nested) = obj.get(container).and_then(Value::as_object) {
            for key in NESTED_KEYS {
                if let Some(url) = nested.get(key).and_then(Value::as_str).filter(|s| looks_like_ref(s)) {
                    return Some(url);
                }
            }
        }
    }

    None
}

/// Like [`extract_artifact_url`], but a miss after a terminal-success status
/// is a hard [`ProviderError::MalformedResponse`] carrying a payload snippet.
pub fn require_artifact_url(payload: &Value) -> ProviderResult<&str> {
    extract_artifact_url(payload)
        .ok_or_else(|| ProviderError::malformed("no artifact reference in response", payload))
}

/// A retrievable reference: http(s) URL or an inline data URI.
fn looks_like_ref(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("data:")
}
