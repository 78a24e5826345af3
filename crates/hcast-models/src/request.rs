//! Generation request types.
//!
//! All request parameters travel explicitly through these values; nothing is
//! passed through process-wide environment variables, so concurrent requests
//! cannot observe each other's inputs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capability::Capability;

/// Where an input (face image, waveform) lives.
///
/// Subprocess backends and multipart uploads want a local file; URL-only
/// backends (RunPod-style) want an already hosted reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Path(PathBuf),
    Url(String),
}

impl InputSource {
    pub fn path(p: impl Into<PathBuf>) -> Self {
        Self::Path(p.into())
    }

    pub fn url(u: impl Into<String>) -> Self {
        Self::Url(u.into())
    }

    /// Local path, if this input is a file.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            InputSource::Path(p) => Some(p),
            InputSource::Url(_) => None,
        }
    }

    /// Hosted URL, if this input is already uploaded.
    pub fn as_url(&self) -> Option<&str> {
        match self {
            InputSource::Path(_) => None,
            InputSource::Url(u) => Some(u),
        }
    }
}

/// Output shape hints passed through to backends.
///
/// Backends use what they understand and ignore the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputHints {
    /// Frame rate for lip-sync renders.
    pub fps: u32,
    /// Square frame size in pixels for lip-sync renders.
    pub size: u32,
    /// Aspect ratio for text-to-video renders, e.g. "16:9", "9:16", "1:1".
    pub aspect_ratio: String,
    /// Clip duration in seconds for text-to-video renders.
    pub duration_secs: u32,
    /// Resolution tier, e.g. "720p", "1080p".
    pub resolution: String,
    /// Ask the backend to generate its own audio track when it can.
    pub generate_audio: bool,
}

impl Default for OutputHints {
    fn default() -> Self {
        Self {
            fps: 25,
            size: 512,
            aspect_ratio: "16:9".to_string(),
            duration_secs: 8,
            resolution: "720p".to_string(),
            generate_audio: true,
        }
    }
}

impl OutputHints {
    /// Duration formatted the way queue backends expect it ("8s").
    pub fn duration_label(&self) -> String {
        format!("{}s", self.duration_secs)
    }
}

/// One talking-head generation request. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Name of the backend to route to.
    pub backend: String,
    /// Capability the request needs from that backend.
    pub capability: Capability,
    /// Face image; required by lip-sync backends, optional reference for
    /// text-to-video.
    pub face: Option<InputSource>,
    /// Text to speak (or the text-to-video prompt).
    pub text: String,
    /// Pre-rendered waveform; synthesized from `text` when absent.
    pub audio: Option<InputSource>,
    /// Voice hint for engines/backends that synthesize speech themselves.
    pub voice: Option<String>,
    /// Output shape hints.
    pub hints: OutputHints,
}

impl GenerationRequest {
    pub fn new(backend: impl Into<String>, capability: Capability, text: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            capability,
            face: None,
            text: text.into(),
            audio: None,
            voice: None,
            hints: OutputHints::default(),
        }
    }

    pub fn with_face(mut self, face: InputSource) -> Self {
        self.face = Some(face);
        self
    }

    pub fn with_audio(mut self, audio: InputSource) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_hints(mut self, hints: OutputHints) -> Self {
        self.hints = hints;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_source_accessors() {
        let p = InputSource::path("/tmp/face.png");
        assert!(p.as_path().is_some());
        assert!(p.as_url().is_none());

        let u = InputSource::url("https://cdn.example.com/face.png");
        assert_eq!(u.as_url(), Some("https://cdn.example.com/face.png"));
        assert!(u.as_path().is_none());
    }

    #[test]
    fn test_default_hints() {
        let hints = OutputHints::default();
        assert_eq!(hints.fps, 25);
        assert_eq!(hints.size, 512);
        assert_eq!(hints.duration_label(), "8s");
    }

    #[test]
    fn test_request_builder() {
        let req = GenerationRequest::new("wav2lip", Capability::LipSync, "hello there")
            .with_face(InputSource::path("/tmp/face.png"))
            .with_voice("amy");

        assert_eq!(req.backend, "wav2lip");
        assert_eq!(req.capability, Capability::LipSync);
        assert!(req.face.is_some());
        assert_eq!(req.voice.as_deref(), Some("amy"));
        assert!(req.audio.is_none());
    }
}
