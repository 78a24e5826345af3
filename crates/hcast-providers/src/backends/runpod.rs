//! RunPod public-endpoint backend.
//!
//! Asynchronous job shape over RunPod's serverless contract:
//! `POST /v2/{endpoint}/run` then `GET /v2/{endpoint}/status/{id}`. The
//! endpoint consumes hosted URLs, not raw files, so both inputs must arrive
//! as `InputSource::Url`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use hcast_models::{Capability, CapabilitySet, JobState, ResultArtifact};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{self, json_body};
use crate::lifecycle::{Clock, DriverConfig, JobApi, JobDriver, JobHandle, PollStatus, Submission, TokioClock};
use crate::provider::{LipSyncInput, VideoBackend};

#[derive(Debug, Clone)]
pub struct RunPodConfig {
    pub api_key: String,
    /// Serverless endpoint name, e.g. "InfiniteTalk".
    pub endpoint: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub driver: DriverConfig,
}

impl RunPodConfig {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            base_url: "https://api.runpod.ai".to_string(),
            request_timeout: Duration::from_secs(60),
            driver: DriverConfig::default(),
        }
    }

    fn run_url(&self) -> String {
        format!(
            "{}/v2/{}/run",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_matches('/')
        )
    }

    fn status_url(&self, id: &str) -> String {
        format!(
            "{}/v2/{}/status/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_matches('/'),
            id
        )
    }
}

pub struct RunPodBackend {
    config: RunPodConfig,
    client: Client,
    driver: JobDriver,
}

impl RunPodBackend {
    pub fn new(config: RunPodConfig) -> ProviderResult<Self> {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    pub fn with_clock(config: RunPodConfig, clock: Arc<dyn Clock>) -> ProviderResult<Self> {
        let client = http::build_client(config.request_timeout)?;
        let driver = JobDriver::with_clock(config.driver.clone(), clock);
        Ok(Self {
            config,
            client,
            driver,
        })
    }
}

struct RunPodJob<'a> {
    backend: &'a RunPodBackend,
    payload: serde_json::Value,
}

#[async_trait]
impl JobApi for RunPodJob<'_> {
    fn backend_name(&self) -> &str {
        "runpod"
    }

    async fn submit(&self) -> ProviderResult<Submission> {
        let resp = self
            .backend
            .client
            .post(self.backend.config.run_url())
            .bearer_auth(&self.backend.config.api_key)
            .json(&self.payload)
            .send()
            .await?;
        let payload = json_body(resp).await?;

        let job_id = payload["id"]
            .as_str()
            .or_else(|| payload["requestId"].as_str())
            .ok_or_else(|| ProviderError::malformed("run response without job id", &payload))?;

        Ok(Submission::Accepted(JobHandle::from_id(job_id)))
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<PollStatus> {
        let resp = self
            .backend
            .client
            .get(self.backend.config.status_url(&handle.id))
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
impl VideoBackend for RunPodBackend {
    fn name(&self) -> &'static str {
        "runpod"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from(Capability::LipSync)
    }

    async fn lip_sync(
        &self,
        input: &LipSyncInput,
        out_mp4: &Path,
    ) -> ProviderResult<ResultArtifact> {
        let image_url = input.face.as_url().ok_or_else(|| {
            ProviderError::invalid_input("runpod requires a hosted face image URL")
        })?;
        let audio_url = input
            .audio
            .as_ref()
            .and_then(|a| a.as_url())
            .ok_or_else(|| ProviderError::invalid_input("runpod requires a hosted audio URL"))?;

        let payload = json!({
            "input": {
                "prompt": if input.text.is_empty() { "lip sync" } else { input.text.as_str() },
                "image": image_url,
                "audio": audio_url,
                "fps": input.hints.fps,
                "size": input.hints.size,
                "enable_safety_checker": true,
            }
        });

        let job = RunPodJob {
            backend: self,
            payload,
        };

        let final_payload = self.driver.run(&job).await?;
        let url = crate::extract::require_artifact_url(&final_payload)?;
        info!(backend = self.name(), "downloading artifact");
        http::download_to(&self.client, url, out_mp4).await?;
        Ok(ResultArtifact::video(out_mp4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcast_models::{InputSource, OutputHints};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> RunPodConfig {
        RunPodConfig {
            api_key: "rp-key".to_string(),
            endpoint: "InfiniteTalk".to_string(),
            base_url,
            request_timeout: Duration::from_secs(5),
            driver: DriverConfig {
                poll_interval: Duration::from_millis(10),
                deadline: Duration::from_secs(5),
                max_submit_retries: 2,
                backoff: crate::backoff::BackoffPolicy::new(
                    Duration::from_millis(10),
                    Duration::from_millis(40),
                ),
            },
        }
    }

    fn url_input() -> LipSyncInput {
        LipSyncInput {
            face: InputSource::url("https://cdn.example.com/face.png"),
            audio: Some(InputSource::url("https://cdn.example.com/speech.wav")),
            text: "hello".into(),
            voice: None,
            hints: OutputHints::default(),
        }
    }

    #[tokio::test]
    async fn test_local_path_inputs_rejected_before_any_io() {
        let backend = RunPodBackend::new(test_config("https://api.runpod.ai".into())).unwrap();
        let input = LipSyncInput {
            face: InputSource::path("/tmp/face.png"),
            ..url_input()
        };
        let err = backend
            .lip_sync(&input, Path::new("/tmp/out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_run_then_status_then_download() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/InfiniteTalk/run"))
            .and(body_partial_json(serde_json::json!({
                "input": { "image": "https://cdn.example.com/face.png" }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "rp-1" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/InfiniteTalk/status/rp-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "status": "IN_QUEUE" })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/InfiniteTalk/status/rp-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "COMPLETED",
                "output": { "video_url": format!("{}/files/rp.mp4", server.uri()) },
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/files/rp.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"runpod-video".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        let backend = RunPodBackend::new(test_config(server.uri())).unwrap();
        backend.lip_sync(&url_input(), &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"runpod-video");
    }

    #[tokio::test]
    async fn test_failed_status_surfaces_job_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/InfiniteTalk/run"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "requestId": "rp-2" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/InfiniteTalk/status/rp-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "FAILED",
                "error": "no face detected",
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let backend = RunPodBackend::new(test_config(server.uri())).unwrap();
        let err = backend
            .lip_sync(&url_input(), &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        match err {
            ProviderError::JobFailed { detail } => assert!(detail.contains("no face detected")),
            other => panic!("expected JobFailed, got {other}"),
        }
    }
}
