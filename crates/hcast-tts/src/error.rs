//! TTS error types.

use std::path::PathBuf;
use thiserror::Error;

pub type TtsResult<T> = Result<T, TtsError>;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS engine binary not found or not executable: {0}")]
    EngineNotFound(PathBuf),

    #[error("Voice model not found: {0}")]
    VoiceNotFound(PathBuf),

    #[error("Empty text")]
    EmptyText,

    #[error("Synthesis failed: {message}")]
    SynthesisFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TtsError {
    pub fn synthesis_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::SynthesisFailed {
            message: message.into(),
            stderr,
        }
    }
}
