//! Provider error taxonomy.
//!
//! Classification is status-code first: 409/429 are rate-limit transients,
//! other 4xx are rejections, 5xx are upstream transients. Message-substring
//! sniffing exists only as a fallback for backends whose error bodies hide
//! the code (see [`ProviderError::transient_from_message`]).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use hcast_models::Capability;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Why a transient error is considered transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// Backend signalled a rate/concurrency limit (409/429-equivalent).
    RateLimited,
    /// Backend-side failure expected to clear (5xx-equivalent).
    Upstream,
    /// Transport-level hiccup (connect/timeout on our side).
    Transport,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientKind::RateLimited => "rate_limited",
            TransientKind::Upstream => "upstream",
            TransientKind::Transport => "transport",
        }
    }
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced by backend clients and the lifecycle engine.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Unknown backend '{name}' (registered: {known})")]
    UnknownBackend { name: String, known: String },

    #[error("Backend '{backend}' does not support capability '{capability}'")]
    CapabilityMismatch {
        backend: String,
        capability: Capability,
    },

    #[error("Backend rejected the request ({status_label}): {message}")]
    Rejected {
        status: Option<u16>,
        status_label: String,
        message: String,
    },

    #[error("Transient backend error ({kind}): {message}")]
    Transient {
        kind: TransientKind,
        message: String,
    },

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Backend job failed: {detail}")]
    JobFailed { detail: String },

    #[error("Malformed backend response: {detail}; payload: {payload}")]
    MalformedResponse { detail: String, payload: String },

    #[error("Backend timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Longest raw-payload slice carried inside an error.
const PAYLOAD_SNIPPET_MAX: usize = 800;

impl ProviderError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn capability_mismatch(backend: impl Into<String>, capability: Capability) -> Self {
        Self::CapabilityMismatch {
            backend: backend.into(),
            capability,
        }
    }

    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        let status_label = match status {
            Some(code) => format!("status {code}"),
            None => "no status".to_string(),
        };
        Self::Rejected {
            status,
            status_label,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::Transient {
            kind: TransientKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Transient {
            kind: TransientKind::Upstream,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transient {
            kind: TransientKind::Transport,
            message: message.into(),
        }
    }

    pub fn job_failed(detail: impl Into<String>) -> Self {
        Self::JobFailed {
            detail: detail.into(),
        }
    }

    /// Malformed-response error carrying a bounded slice of the raw payload.
    pub fn malformed(detail: impl Into<String>, payload: &serde_json::Value) -> Self {
        Self::MalformedResponse {
            detail: detail.into(),
            payload: snippet(&payload.to_string()),
        }
    }

    pub fn retries_exhausted(attempts: u32, last: &ProviderError) -> Self {
        Self::RetriesExhausted {
            attempts,
            last: last.to_string(),
        }
    }

    /// Fallback classifier for backends whose error bodies bury the status:
    /// sniffs the message for concurrency/rate-limit wording. Prefer
    /// status-code classification wherever the protocol exposes one.
    pub fn transient_from_message(message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("concurrent")
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            return Some(Self::rate_limited(message));
        }
        None
    }

    /// Whether the submit/poll loop may retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transient { .. } => true,
            ProviderError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Whether this is specifically a rate/concurrency gate.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient {
                kind: TransientKind::RateLimited,
                ..
            }
        )
    }
}

/// Truncate a raw payload for inclusion in an error message.
pub(crate) fn snippet(raw: &str) -> String {
    if raw.len() <= PAYLOAD_SNIPPET_MAX {
        raw.to_string()
    } else {
        let mut end = PAYLOAD_SNIPPET_MAX;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &raw[..end])
    }
}
