//! Fal queue backend for text-to-video generation.
//!
//! Asynchronous queue shape: JSON submit to `{queue_base}/{endpoint}`,
//! 409/429 treated as a concurrency gate (backoff + resubmit), the accepted
//! response carries `status_url`/`response_url`, and the final payload is
//! fetched from `response_url` once the status goes terminal.
//!
//! Submission payloads are declared as an ordered variant list (full, then
//! minimal); a schema-shaped rejection advances the list at most once
//! instead of failing the request outright.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use hcast_models::{Capability, CapabilitySet, InputSource, JobState, ResultArtifact};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{self, json_body};
use crate::lifecycle::{Clock, DriverConfig, JobApi, JobDriver, JobHandle, PollStatus, Submission, TokioClock};
use crate::provider::{TextToVideoInput, VideoBackend};

/// Interval between `response_url` fetch attempts while the payload
/// propagates to the response endpoint.
const RESPONSE_RETRY_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct FalQueueConfig {
    pub api_key: String,
    /// Model route, e.g. "fal-ai/veo3".
    pub endpoint: String,
    pub queue_base: String,
    pub request_timeout: Duration,
    /// How long to keep retrying the `response_url` fetch after a terminal
    /// status before giving up.
    pub response_grace: Duration,
    pub driver: DriverConfig,
}

impl FalQueueConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: "fal-ai/veo3".to_string(),
            queue_base: "https://queue.fal.run".to_string(),
            request_timeout: Duration::from_secs(45),
            response_grace: Duration::from_secs(60),
            driver: DriverConfig {
                poll_interval: Duration::from_secs(2),
                deadline: Duration::from_secs(1800),
                max_submit_retries: 30,
                backoff: crate::backoff::BackoffPolicy::new(
                    Duration::from_secs(5),
                    Duration::from_secs(60),
                ),
            },
        }
    }

    fn queue_url(&self) -> ProviderResult<String> {
        let joined = format!(
            "{}/{}",
            self.queue_base.trim_end_matches('/'),
            self.endpoint.trim_matches('/')
        );
        let parsed = url::Url::parse(&joined)
            .map_err(|e| ProviderError::invalid_input(format!("bad queue URL '{joined}': {e}")))?;
        Ok(parsed.into())
    }
}

pub struct FalQueueBackend {
    config: FalQueueConfig,
    client: Client,
    driver: JobDriver,
    clock: Arc<dyn Clock>,
}

impl FalQueueBackend {
    pub fn new(config: FalQueueConfig) -> ProviderResult<Self> {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    pub fn with_clock(config: FalQueueConfig, clock: Arc<dyn Clock>) -> ProviderResult<Self> {
        let client = http::build_client(config.request_timeout)?;
        let driver = JobDriver::with_clock(config.driver.clone(), clock.clone());
        Ok(Self {
            config,
            client,
            driver,
            clock,
        })
    }

    /// Payload variants in declared order: full schema first, minimal
    /// fallback second.
    fn payload_variants(&self, input: &TextToVideoInput) -> ProviderResult<Vec<Value>> {
        let mut full = json!({
            "prompt": input.prompt,
            "aspect_ratio": input.hints.aspect_ratio,
            "duration": input.hints.duration_label(),
            "resolution": input.hints.resolution,
            "enhance_prompt": true,
            "auto_fix": true,
            "generate_audio": input.hints.generate_audio,
        });

        if let Some(reference) = &input.reference_image {
            full["image_url"] = Value::String(reference_image_url(reference)?);
        }

        let minimal = json!({
            "prompt": input.prompt,
            "aspect_ratio": input.hints.aspect_ratio,
        });

        Ok(vec![full, minimal])
    }
}

/// Hosted references pass through; local files are inlined as data URIs.
fn reference_image_url(source: &InputSource) -> ProviderResult<String> {
    match source {
        InputSource::Url(url) => Ok(url.clone()),
        InputSource::Path(path) => {
            if !path.is_file() {
                return Err(ProviderError::InputNotFound(path.clone()));
            }
            let bytes = std::fs::read(path)?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            Ok(format!("data:image/png;base64,{encoded}"))
        }
    }
}

/// A rejection that looks like a request-schema mismatch rather than a bad
/// input per se.
fn is_schema_rejection(err: &ProviderError) -> bool {
    match err {
        ProviderError::Rejected { status, message, .. } => {
            *status == Some(422)
                || message.to_lowercase().contains("field required")
                || message.to_lowercase().contains("unknown field")
        }
        _ => false,
    }
}

struct FalJob<'a> {
    backend: &'a FalQueueBackend,
    variants: Vec<Value>,
    variant_idx: AtomicUsize,
}

impl FalJob<'_> {
    async fn submit_variant(&self, payload: &Value) -> ProviderResult<Value> {
        let resp = self
            .backend
            .client
            .post(self.backend.config.queue_url()?)
            .header("Authorization", format!("Key {}", self.backend.config.api_key))
            .json(payload)
            .send()
            .await?;
        json_body(resp).await
    }
}

#[async_trait]
impl JobApi for FalJob<'_> {
    fn backend_name(&self) -> &str {
        "fal_queue"
    }

    async fn submit(&self) -> ProviderResult<Submission> {
        let payload = loop {
            let idx = self.variant_idx.load(Ordering::SeqCst);
            match self.submit_variant(&self.variants[idx]).await {
                Ok(payload) => break payload,
                Err(e) if is_schema_rejection(&e) && idx + 1 < self.variants.len() => {
                    warn!(
                        backend = self.backend_name(),
                        "schema mismatch ({e}), falling back to minimal payload"
                    );
                    self.variant_idx.store(idx + 1, Ordering::SeqCst);
                }
                Err(e) => return Err(e),
            }
        };

        let status_url = payload["status_url"].as_str();
        let response_url = payload["response_url"].as_str();
        let (status_url, response_url) = match (status_url, response_url) {
            (Some(s), Some(r)) => (s.to_string(), r.to_string()),
            _ => {
                return Err(ProviderError::malformed(
                    "submit response without status_url/response_url",
                    &payload,
                ))
            }
        };

        let id = payload["request_id"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| status_url.clone());

        Ok(Submission::Accepted(JobHandle {
            id,
            status_url: Some(status_url),
            result_url: Some(response_url),
        }))
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<PollStatus> {
        let status_url = handle.status_url.as_deref().ok_or_else(|| {
            ProviderError::invalid_input("fal job handle without status_url")
        })?;

        let resp = self
            .backend
            .client
            .get(status_url)
            .header("Authorization", format!("Key {}", self.backend.config.api_key))
            .send()
            .await?;
        let payload = json_body(resp).await?;

        let raw = payload["status"].as_str().unwrap_or("");
        Ok(PollStatus {
            state: JobState::from_raw(raw),
            payload,
        })
    }

    async fn finalize(&self, handle: &JobHandle, last: Value) -> ProviderResult<Value> {
        let response_url = match handle.result_url.as_deref() {
            Some(url) => url,
            // Some deployments inline the result into the terminal status.
            None => return Ok(last),
        };

        let start = self.backend.clock.now();
        loop {
            let attempt = async {
                let resp = self
                    .backend
                    .client
                    .get(response_url)
                    .header("Authorization", format!("Key {}", self.backend.config.api_key))
                    .send()
                    .await?;
                json_body(resp).await
            }
            .await;

            match attempt {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    if self.backend.clock.now().duration_since(start)
                        > self.backend.config.response_grace
                    {
                        return Err(e);
                    }
                    self.backend.clock.sleep(RESPONSE_RETRY_INTERVAL).await;
                }
            }
        }
    }
}

#[async_trait]
impl VideoBackend for FalQueueBackend {
    fn name(&self) -> &'static str {
        "fal_queue"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from(Capability::TextToVideo)
    }

    async fn text_to_video(
        &self,
        input: &TextToVideoInput,
        out_mp4: &Path,
    ) -> ProviderResult<ResultArtifact> {
        if input.prompt.trim().is_empty() {
            return Err(ProviderError::invalid_input("empty text-to-video prompt"));
        }

        let job = FalJob {
            backend: self,
            variants: self.payload_variants(input)?,
            variant_idx: AtomicUsize::new(0),
        };

        let payload = self.driver.run(&job).await?;
        let url = crate::extract::require_artifact_url(&payload)?;
        info!(backend = self.name(), "downloading artifact");
        http::download_to(&self.client, url, out_mp4).await?;
        Ok(ResultArtifact::video(out_mp4))
    }
}
