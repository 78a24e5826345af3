//! D-ID talks backend.
//!
//! Asynchronous job shape with its own voice synthesis: the face image is
//! uploaded first (returning a hosted URL), then a talk is created from that
//! URL plus the text script, then `/talks/{id}` is polled until done. The
//! script always goes up as plain text; configured SSML is stripped to text
//! because not every plan accepts `ssml` scripts.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use hcast_models::{Capability, CapabilitySet, InputSource, JobState, ResultArtifact};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{self, basic_auth_value, json_body};
use crate::lifecycle::{Clock, DriverConfig, JobApi, JobDriver, JobHandle, PollStatus, Submission, TokioClock};
use crate::provider::{LipSyncInput, VideoBackend};

#[derive(Debug, Clone)]
pub struct DidConfig {
    pub api_key: String,
    pub base_url: String,
    /// Voice used by D-ID's own synthesis.
    pub voice_id: String,
    pub voice_provider: String,
    /// Strip SSML markup from the script before sending.
    pub strip_ssml: bool,
    /// Optional public MP4 that drives head motion.
    pub driver_url: Option<String>,
    pub request_timeout: Duration,
    pub driver: DriverConfig,
}

impl DidConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.d-id.com".to_string(),
            voice_id: "en-US-GuyNeural".to_string(),
            voice_provider: "microsoft".to_string(),
            strip_ssml: false,
            driver_url: None,
            request_timeout: Duration::from_secs(60),
            driver: DriverConfig::default(),
        }
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), route)
    }
}

pub struct DidBackend {
    config: DidConfig,
    client: Client,
    driver: JobDriver,
    auth_header: String,
}

impl DidBackend {
    pub fn new(config: DidConfig) -> ProviderResult<Self> {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    pub fn with_clock(config: DidConfig, clock: Arc<dyn Clock>) -> ProviderResult<Self> {
        let client = http::build_client(config.request_timeout)?;
        let driver = JobDriver::with_clock(config.driver.clone(), clock);
        let auth_header = basic_auth_value(&config.api_key);
        Ok(Self {
            config,
            client,
            driver,
            auth_header,
        })
    }

    /// Upload a local face image; returns the hosted URL D-ID assigns.
    async fn upload_image(&self, face: &Path) -> ProviderResult<String> {
        let bytes = tokio::fs::read(face).await?;
        let file_name = face
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "face.png".to_string());
        let form = Form::new().part(
            "image",
            Part::bytes(bytes)
                .file_name(file_name)
                .mime_str("application/octet-stream")?,
        );

        let resp = self
            .client
            .post(self.config.endpoint("images"))
            .header("Authorization", &self.auth_header)
            .multipart(form)
            .send()
            .await?;
        let payload = json_body(resp).await?;

        payload["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::malformed("image upload response without url", &payload))
    }
}

/// Remove SSML tags and collapse whitespace, keeping punctuation.
fn strip_ssml(text: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"));
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    let no_tags = tag.replace_all(text, " ");
    let unescaped = no_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    space.replace_all(&unescaped, " ").trim().to_string()
}

struct TalkJob<'a> {
    backend: &'a DidBackend,
    face: InputSource,
    script_text: String,
}

#[async_trait]
impl JobApi for TalkJob<'_> {
    fn backend_name(&self) -> &str {
        "did"
    }

    async fn submit(&self) -> ProviderResult<Submission> {
        let source_url = match &self.face {
            InputSource::Url(url) => url.clone(),
            InputSource::Path(path) => self.backend.upload_image(path).await?,
        };

        let mut body = json!({
            "source_url": source_url,
            "script": {
                "type": "text",
                "input": self.script_text,
                "provider": {
                    "type": self.backend.config.voice_provider,
                    "voice_id": self.backend.config.voice_id,
                },
            },
            "config": { "stitch": true },
        });
        if let Some(driver_url) = &self.backend.config.driver_url {
            body["driver_url"] = Value::String(driver_url.clone());
        }

        let resp = self
            .backend
            .client
            .post(self.backend.config.endpoint("talks"))
            .header("Authorization", &self.backend.auth_header)
            .json(&body)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => return Err(e.into()),
        };
        let payload = match json_body(resp).await {
            Ok(payload) => payload,
            // D-ID's error bodies sometimes bury the concurrency signal in
            // prose; fall back to message sniffing before giving up.
            Err(ProviderError::Rejected { status, message, .. }) => {
                if let Some(transient) = ProviderError::transient_from_message(&message) {
                    return Err(transient);
                }
                return Err(ProviderError::rejected(status, message));
            }
            Err(e) => return Err(e),
        };

        let talk_id = payload["id"]
            .as_str()
            .ok_or_else(|| ProviderError::malformed("talk response without id", &payload))?;
        Ok(Submission::Accepted(JobHandle::from_id(talk_id)))
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<PollStatus> {
        let resp = self
            .backend
            .client
            .get(self.backend.config.endpoint(&format!("talks/{}", handle.id)))
            .header("Authorization", &self.backend.auth_header)
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
impl VideoBackend for DidBackend {
    fn name(&self) -> &'static str {
        "did"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from(Capability::LipSync)
    }

    async fn lip_sync(
        &self,
        input: &LipSyncInput,
        out_mp4: &Path,
    ) -> ProviderResult<ResultArtifact> {
        if input.text.trim().is_empty() {
            return Err(ProviderError::invalid_input("empty script text"));
        }
        if let Some(path) = input.face.as_path() {
            if !path.is_file() {
                return Err(ProviderError::InputNotFound(path.to_path_buf()));
            }
        }

        let script_text = if self.config.strip_ssml {
            strip_ssml(&input.text)
        } else {
            input.text.clone()
        };

        let job = TalkJob {
            backend: self,
            face: input.face.clone(),
            script_text,
        };

        let payload = self.driver.run(&job).await?;
        // `result_url` is D-ID specific; the shared shapes cover `result.url`.
        let url = match payload["result_url"].as_str() {
            Some(url) => url,
            None => crate::extract::require_artifact_url(&payload)?,
        };
        info!(backend = self.name(), "downloading artifact");
        http::download_to(&self.client, url, out_mp4).await?;
        Ok(ResultArtifact::video(out_mp4))
    }
}
