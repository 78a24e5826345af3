//! The uniform backend contract.

use std::path::Path;

use async_trait::async_trait;

use hcast_models::{Capability, CapabilitySet, InputSource, OutputHints, ResultArtifact};

use crate::error::{ProviderError, ProviderResult};

/// Inputs for a lip-sync generation.
///
/// Carries both the waveform and the source text: subprocess models consume
/// the waveform, while backends that voice the script themselves (D-ID)
/// consume the text and ignore the waveform.
#[derive(Debug, Clone)]
pub struct LipSyncInput {
    pub face: InputSource,
    pub audio: Option<InputSource>,
    pub text: String,
    pub voice: Option<String>,
    pub hints: OutputHints,
}

/// Inputs for a text-to-video generation.
#[derive(Debug, Clone)]
pub struct TextToVideoInput {
    pub prompt: String,
    pub reference_image: Option<InputSource>,
    pub hints: OutputHints,
}

/// One generation backend.
///
/// Both execution shapes live behind this interface: synchronous clients
/// block until the artifact is on disk; asynchronous clients drive a
/// [`crate::lifecycle::JobDriver`] internally and return once the artifact
/// has been downloaded. Either way the artifact is written to the
/// caller-supplied output path.
///
/// The default method bodies reject with `CapabilityMismatch`, so an
/// implementation only overrides what its declared capability set covers.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Declared capability set.
    fn capabilities(&self) -> CapabilitySet;

    /// Produce a synchronized talking-head video.
    async fn lip_sync(
        &self,
        input: &LipSyncInput,
        out_mp4: &Path,
    ) -> ProviderResult<ResultArtifact> {
        let _ = (input, out_mp4);
        Err(ProviderError::capability_mismatch(
            self.name(),
            Capability::LipSync,
        ))
    }

    /// Produce a video from a text prompt.
    async fn text_to_video(
        &self,
        input: &TextToVideoInput,
        out_mp4: &Path,
    ) -> ProviderResult<ResultArtifact> {
        let _ = (input, out_mp4);
        Err(ProviderError::capability_mismatch(
            self.name(),
            Capability::TextToVideo,
        ))
    }
}

impl std::fmt::Debug for dyn VideoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoBackend")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Pre-flight check shared by clients that need a local file on disk.
pub(crate) fn ensure_local_file(source: &InputSource, what: &str) -> ProviderResult<std::path::PathBuf> {
    let path = source.as_path().ok_or_else(|| {
        ProviderError::invalid_input(format!("{what} must be a local file for this backend"))
    })?;
    if !path.is_file() {
        return Err(ProviderError::InputNotFound(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}
