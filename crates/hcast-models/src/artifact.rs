//! Result artifacts.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Declared media kind of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A generated artifact materialized on local disk.
///
/// Backends write the payload to the caller-supplied output path and return
/// one of these. The path typically lives in a request-scoped temp dir, so
/// callers read the bytes before that dir is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultArtifact {
    pub path: PathBuf,
    pub media: MediaKind,
}

impl ResultArtifact {
    pub fn video(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            media: MediaKind::Video,
        }
    }

    pub fn audio(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            media: MediaKind::Audio,
        }
    }
}
