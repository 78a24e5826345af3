//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("TTS error: {0}")]
    Tts(#[from] hcast_tts::TtsError),

    #[error("Provider error: {0}")]
    Provider(#[from] hcast_providers::ProviderError),

    #[error("Media error: {0}")]
    Media(#[from] hcast_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
