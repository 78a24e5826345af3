//! Wav2Lip local subprocess backend.
//!
//! Synchronous execution shape: the inference script is an opaque
//! collaborator that takes file paths and either writes the output video or
//! fails. No job entity is created.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use hcast_models::{Capability, CapabilitySet, ResultArtifact};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ensure_local_file, LipSyncInput, VideoBackend};

/// Wav2Lip installation layout.
#[derive(Debug, Clone)]
pub struct Wav2LipConfig {
    /// GAN checkpoint weights.
    pub checkpoint: PathBuf,
    /// Checkout of the inference repo (cwd for the subprocess).
    pub repo_dir: PathBuf,
    /// Python interpreter to run `inference.py` with.
    pub python_bin: String,
}

impl Default for Wav2LipConfig {
    fn default() -> Self {
        Self {
            checkpoint: PathBuf::from("/models/wav2lip/wav2lip_gan.pth"),
            repo_dir: PathBuf::from("/app/Wav2Lip"),
            python_bin: "python".to_string(),
        }
    }
}

pub struct Wav2LipBackend {
    config: Wav2LipConfig,
}

impl Wav2LipBackend {
    pub fn new(config: Wav2LipConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl VideoBackend for Wav2LipBackend {
    fn name(&self) -> &'static str {
        "wav2lip"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from(Capability::LipSync)
    }

    async fn lip_sync(
        &self,
        input: &LipSyncInput,
        out_mp4: &Path,
    ) -> ProviderResult<ResultArtifact> {
        let face = ensure_local_file(&input.face, "face image")?;
        let audio_source = input
            .audio
            .as_ref()
            .ok_or_else(|| ProviderError::invalid_input("wav2lip requires a waveform"))?;
        let audio = ensure_local_file(audio_source, "audio")?;

        if !self.config.checkpoint.is_file() {
            return Err(ProviderError::InputNotFound(self.config.checkpoint.clone()));
        }

        if let Some(parent) = out_mp4.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Inference upscales small faces poorly; resize instead of padding.
        let size = input.hints.size.clamp(128, 512);
        let resize_factor = (512 / size).max(1);

        let pythonpath = format!(
            "{}:{}",
            self.config.repo_dir.display(),
            self.config.repo_dir.join("face_detection").display()
        );

        info!(
            face = %face.display(),
            audio = %audio.display(),
            "running wav2lip inference"
        );

        let output = Command::new(&self.config.python_bin)
            .arg("-u")
            .arg("inference.py")
            .arg("--checkpoint_path")
            .arg(&self.config.checkpoint)
            .arg("--face")
            .arg(&face)
            .arg("--audio")
            .arg(&audio)
            .arg("--outfile")
            .arg(out_mp4)
            .arg("--fps")
            .arg(input.hints.fps.to_string())
            .arg("--resize_factor")
            .arg(resize_factor.to_string())
            .args(["--face_det_batch_size", "1"])
            .args(["--wav2lip_batch_size", "16"])
            .args(["--pads", "0", "10", "0", "10"])
            .current_dir(&self.config.repo_dir)
            .env("PYTHONPATH", pythonpath)
            .env("OMP_NUM_THREADS", "1")
            .env("MKL_NUM_THREADS", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(10)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ProviderError::job_failed(format!(
                "wav2lip inference exited with {:?}: {tail}",
                output.status.code()
            )));
        }

        if !out_mp4.is_file() {
            return Err(ProviderError::job_failed(
                "wav2lip inference produced no output file",
            ));
        }

        debug!("wav2lip wrote {}", out_mp4.display());
        Ok(ResultArtifact::video(out_mp4))
    }
}
