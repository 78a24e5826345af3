//! Text-to-speech collaborator boundary.
//!
//! The pipeline treats speech synthesis as a black box: text in, WAV file
//! out. This crate defines that seam and ships the Piper subprocess engine.

pub mod error;
pub mod piper;

pub use error::{TtsError, TtsResult};
pub use piper::PiperEngine;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// A speech synthesis engine.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &'static str;

    /// Synthesize `text` into a WAV file at `out_wav`.
    ///
    /// `voice` overrides the engine's configured voice when given. Returns
    /// the path the waveform was written to.
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        out_wav: &Path,
    ) -> TtsResult<PathBuf>;
}
