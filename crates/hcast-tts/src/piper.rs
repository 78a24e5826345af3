//! Piper subprocess engine.
//!
//! Piper reads the text on stdin and writes a WAV to the path given with
//! `-f`. The voice is an ONNX model file passed with `-m`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{TtsError, TtsResult};
use crate::TtsEngine;

/// Default install location inside the service image.
const DEFAULT_PIPER_BIN: &str = "/opt/piper/piper";
const DEFAULT_VOICE_PATH: &str = "/opt/piper/voices/en_US-amy-medium.onnx";

/// Speech synthesis via the Piper binary.
#[derive(Debug, Clone)]
pub struct PiperEngine {
    binary: PathBuf,
    voice_path: PathBuf,
}

impl PiperEngine {
    /// Create an engine with explicit binary and voice paths.
    pub fn new(binary: impl Into<PathBuf>, voice_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: resolve_binary(binary.into()),
            voice_path: voice_path.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn voice_path(&self) -> &Path {
        &self.voice_path
    }
}

impl Default for PiperEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PIPER_BIN, DEFAULT_VOICE_PATH)
    }
}

/// Prefer the configured path; fall back to a `piper` on PATH when the
/// configured file is missing.
fn resolve_binary(configured: PathBuf) -> PathBuf {
    if configured.is_file() {
        return configured;
    }
    match which::which("piper") {
        Ok(found) => found,
        Err(_) => configured,
    }
}

#[async_trait]
impl TtsEngine for PiperEngine {
    fn name(&self) -> &'static str {
        "piper"
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        out_wav: &Path,
    ) -> TtsResult<PathBuf> {
        if text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }
        if !self.binary.is_file() {
            return Err(TtsError::EngineNotFound(self.binary.clone()));
        }

        let model: PathBuf = voice
            .map(PathBuf::from)
            .unwrap_or_else(|| self.voice_path.clone());
        if !model.is_file() {
            return Err(TtsError::VoiceNotFound(model));
        }

        if let Some(parent) = out_wav.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(
            "Synthesizing {} chars with piper voice {}",
            text.len(),
            model.display()
        );

        let mut child = Command::new(&self.binary)
            .arg("-m")
            .arg(&model)
            .arg("-f")
            .arg(out_wav)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| TtsError::synthesis_failed("piper stdin not captured", None))?;
            stdin.write_all(text.as_bytes()).await?;
            // Dropping stdin closes the pipe so piper sees EOF.
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(TtsError::synthesis_failed(
                format!("piper exited with status {:?}", output.status.code()),
                Some(stderr),
            ));
        }

        if !out_wav.is_file() {
            return Err(TtsError::synthesis_failed(
                "piper produced no output file",
                None,
            ));
        }

        Ok(out_wav.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let engine = PiperEngine::default();
        let err = engine
            .synthesize("   ", None, Path::new("/tmp/out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::EmptyText));
    }

    #[tokio::test]
    async fn test_missing_binary_reported() {
        let engine = PiperEngine::new("/nonexistent/piper-bin", "/nonexistent/voice.onnx");
        let err = engine
            .synthesize("hello", None, Path::new("/tmp/out.wav"))
            .await
            .unwrap_err();
        // Binary resolution may fall back to PATH; either way the engine must
        // fail pre-flight, never spawn a half-configured synthesis.
        assert!(matches!(
            err,
            TtsError::EngineNotFound(_) | TtsError::VoiceNotFound(_)
        ));
    }

    #[test]
    fn test_resolve_binary_keeps_existing_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve_binary(tmp.path().to_path_buf());
        assert_eq!(resolved, tmp.path());
    }
}
