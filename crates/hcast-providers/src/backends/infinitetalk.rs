//! InfiniteTalk HTTP backend.
//!
//! Asynchronous job shape: multipart submit of the face image and waveform,
//! id-addressed status polls, artifact download once the job reports done.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::info;

use hcast_models::{Capability, CapabilitySet, JobState, ResultArtifact};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{self, json_body};
use crate::lifecycle::{Clock, DriverConfig, JobApi, JobDriver, JobHandle, PollStatus, Submission, TokioClock};
use crate::provider::{ensure_local_file, LipSyncInput, VideoBackend};

#[derive(Debug, Clone)]
pub struct InfiniteTalkConfig {
    pub api_key: String,
    pub base_url: String,
    /// Per-call HTTP timeout for submit/poll requests.
    pub request_timeout: Duration,
    pub driver: DriverConfig,
}

impl InfiniteTalkConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.infinitetalk.net".to_string(),
            request_timeout: Duration::from_secs(60),
            driver: DriverConfig::default(),
        }
    }

    fn talking_head_url(&self) -> String {
        format!("{}/v1/talking-head", self.base_url.trim_end_matches('/'))
    }
}

pub struct InfiniteTalkBackend {
    config: InfiniteTalkConfig,
    client: Client,
    driver: JobDriver,
}

impl InfiniteTalkBackend {
    pub fn new(config: InfiniteTalkConfig) -> ProviderResult<Self> {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    pub fn with_clock(config: InfiniteTalkConfig, clock: Arc<dyn Clock>) -> ProviderResult<Self> {
        let client = http::build_client(config.request_timeout)?;
        let driver = JobDriver::with_clock(config.driver.clone(), clock);
        Ok(Self {
            config,
            client,
            driver,
        })
    }
}

struct TalkingHeadJob<'a> {
    backend: &'a InfiniteTalkBackend,
    face: PathBuf,
    audio: PathBuf,
    fps: u32,
    size: u32,
}

#[async_trait]
impl JobApi for TalkingHeadJob<'_> {
    fn backend_name(&self) -> &str {
        "infinitetalk"
    }

    async fn submit(&self) -> ProviderResult<Submission> {
        // Multipart forms are single-use; rebuild per attempt.
        let face_bytes = tokio::fs::read(&self.face).await?;
        let audio_bytes = tokio::fs::read(&self.audio).await?;
        let form = Form::new()
            .part(
                "image",
                Part::bytes(face_bytes)
                    .file_name("image.png")
                    .mime_str("image/png")?,
            )
            .part(
                "audio",
                Part::bytes(audio_bytes)
                    .file_name("tts.wav")
                    .mime_str("audio/wav")?,
            )
            .text("fps", self.fps.to_string())
            .text("size", self.size.to_string());

        let resp = self
            .backend
            .client
            .post(self.backend.config.talking_head_url())
            .bearer_auth(&self.backend.config.api_key)
            .multipart(form)
            .send()
            .await?;
        let payload = json_body(resp).await?;

        let job_id = payload["id"]
            .as_str()
            .or_else(|| payload["job_id"].as_str())
            .ok_or_else(|| ProviderError::malformed("submit response without job id", &payload))?;

        Ok(Submission::Accepted(JobHandle::from_id(job_id)))
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<PollStatus> {
        let resp = self
            .backend
            .client
            .get(format!(
                "{}/{}",
                self.backend.config.talking_head_url(),
                handle.id
            ))
            .bearer_auth(&self.backend.config.api_key)
            .send()
            .await?;
        let payload = json_body(resp).await?;

        let raw = payload["status"].as_str().unwrap_or("");
        Ok(PollStatus {
            state: JobState::from_raw(raw),
            payload,
        })
    }
}

#[async_trait]
impl VideoBackend for InfiniteTalkBackend {
    fn name(&self) -> &'static str {
        "infinitetalk"
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
            .ok_or_else(|| ProviderError::invalid_input("infinitetalk requires a waveform"))?;
        let audio = ensure_local_file(audio_source, "audio")?;

        let job = TalkingHeadJob {
            backend: self,
            face,
            audio,
            fps: input.hints.fps,
            size: input.hints.size,
        };

        let payload = self.driver.run(&job).await?;
        let url = crate::extract::require_artifact_url(&payload)?;
        info!(backend = self.name(), "downloading artifact");
        http::download_to(&self.client, url, out_mp4).await?;
        Ok(ResultArtifact::video(out_mp4))
    }
}
