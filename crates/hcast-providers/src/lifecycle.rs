//! Job lifecycle engine for asynchronous backends.
//!
//! Drives submit → poll → terminal for any client that exposes the
//! [`JobApi`] pair. Submission retries rate-limit/transient failures through
//! the backoff controller; polling runs at the backend's fixed interval
//! under a wall-clock deadline. Time is reached only through the [`Clock`]
//! trait so tests simulate hours without sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use hcast_models::{Job, JobState};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::error::{snippet, ProviderError, ProviderResult};

/// Time source and sleeper, injectable for tests.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, dur: Duration);
}

/// Real time via tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// Handle to a submitted remote job.
///
/// Id-addressed contracts only need `id`; queue contracts that hand back
/// polling URLs carry them here.
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// Backend-assigned opaque identifier.
    pub id: String,
    /// Status endpoint, when the backend returns one instead of an id route.
    pub status_url: Option<String>,
    /// Final-payload endpoint, when distinct from the status endpoint.
    pub result_url: Option<String>,
}

impl JobHandle {
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_url: None,
            result_url: None,
        }
    }
}

/// Outcome of a submit call.
#[derive(Debug)]
pub enum Submission {
    /// Job accepted; poll until terminal.
    Accepted(JobHandle),
    /// The backend finished synchronously and returned the final payload.
    Immediate(Value),
}

/// One poll observation: canonical state plus the raw payload it came from.
#[derive(Debug, Clone)]
pub struct PollStatus {
    pub state: JobState,
    pub payload: Value,
}

/// The submit/poll pair an asynchronous backend exposes to the driver.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Backend name for job records and logs.
    fn backend_name(&self) -> &str;

    /// Submit the job. Rate-limit/transient errors are retried by the
    /// driver; anything else fails the request.
    async fn submit(&self) -> ProviderResult<Submission>;

    /// Poll current status.
    async fn poll(&self, handle: &JobHandle) -> ProviderResult<PollStatus>;

    /// Produce the final payload after a `Done` poll, for contracts where
    /// the terminal status response doesn't itself carry the artifact.
    async fn finalize(&self, handle: &JobHandle, last: Value) -> ProviderResult<Value> {
        let _ = handle;
        Ok(last)
    }
}

/// Driver tunables, per backend.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Fixed interval between polls. Backoff never stretches this.
    pub poll_interval: Duration,
    /// Wall-clock deadline measured from successful submission.
    pub deadline: Duration,
    /// Retryable submit failures tolerated before `RetriesExhausted`.
    pub max_submit_retries: u32,
    /// Backoff policy for submit retries.
    pub backoff: BackoffPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            deadline: Duration::from_secs(600),
            max_submit_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// The lifecycle engine.
#[derive(Clone)]
pub struct JobDriver {
    config: DriverConfig,
    clock: Arc<dyn Clock>,
}

impl JobDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    pub fn with_clock(config: DriverConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Run a job to its terminal state and return the final payload.
    ///
    /// The job record lives only for the duration of this call; it is
    /// discarded once a terminal state is reached.
    pub async fn run(&self, api: &dyn JobApi) -> ProviderResult<Value> {
        let handle = match self.submit_with_backoff(api).await? {
            Submission::Immediate(payload) => {
                debug!(backend = api.backend_name(), "submit returned immediate result");
                return Ok(payload);
            }
            Submission::Accepted(handle) => handle,
        };

        let mut job = Job::new(handle.id.clone(), api.backend_name());
        info!(
            backend = api.backend_name(),
            job_id = %job.id,
            "job submitted"
        );

        let submitted = self.clock.now();
        loop {
            if self.clock.now().duration_since(submitted) > self.config.deadline {
                job.observe(JobState::TimedOut);
                warn!(
                    backend = api.backend_name(),
                    job_id = %job.id,
                    "job abandoned after {:?}; remote job may still be running",
                    self.config.deadline
                );
                return Err(ProviderError::Timeout {
                    limit: self.config.deadline,
                });
            }

            self.clock.sleep(self.config.poll_interval).await;

            let status = match api.poll(&handle).await {
                Ok(status) => status,
                Err(e) if e.is_retryable() => {
                    // Transport hiccup on the status call: retry in place at
                    // the fixed interval, bounded only by the deadline.
                    debug!(
                        backend = api.backend_name(),
                        job_id = %job.id,
                        "poll failed transiently, will retry: {e}"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            job.observe(status.state);
            match status.state {
                JobState::Done => {
                    info!(
                        backend = api.backend_name(),
                        job_id = %job.id,
                        "job done"
                    );
                    return api.finalize(&handle, status.payload).await;
                }
                JobState::Failed => {
                    return Err(ProviderError::job_failed(snippet(
                        &status.payload.to_string(),
                    )));
                }
                state => {
                    debug!(
                        backend = api.backend_name(),
                        job_id = %job.id,
                        state = %state,
                        "job pending"
                    );
                }
            }
        }
    }

    async fn submit_with_backoff(&self, api: &dyn JobApi) -> ProviderResult<Submission> {
        let mut backoff = Backoff::new(self.config.backoff);
        loop {
            match api.submit().await {
                Ok(submission) => return Ok(submission),
                Err(e) if e.is_retryable() => {
                    let failures = backoff.attempts() + 1;
                    if backoff.attempts() >= self.config.max_submit_retries {
                        return Err(ProviderError::retries_exhausted(failures, &e));
                    }
                    let delay = backoff.next_delay();
                    warn!(
                        backend = api.backend_name(),
                        attempt = failures,
                        "submit gated ({e}), retrying in {delay:?}"
                    );
                    self.clock.sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Clock that advances instantly and records every sleep.
    struct ManualClock {
        start: Instant,
        elapsed: Mutex<Duration>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                elapsed: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + *self.elapsed.lock().unwrap()
        }

        async fn sleep(&self, dur: Duration) {
            *self.elapsed.lock().unwrap() += dur;
            self.sleeps.lock().unwrap().push(dur);
        }
    }

    /// Scripted backend: submit outcomes play in order, the last poll
    /// outcome repeats forever.
    struct ScriptedApi {
        submits: Mutex<VecDeque<ProviderResult<Submission>>>,
        polls: Mutex<VecDeque<ProviderResult<PollStatus>>>,
        last_poll: PollStatus,
    }

    impl ScriptedApi {
        fn new(
            submits: Vec<ProviderResult<Submission>>,
            polls: Vec<ProviderResult<PollStatus>>,
            last_poll: PollStatus,
        ) -> Self {
            Self {
                submits: Mutex::new(submits.into()),
                polls: Mutex::new(polls.into()),
                last_poll,
            }
        }
    }

    #[async_trait]
    impl JobApi for ScriptedApi {
        fn backend_name(&self) -> &str {
            "scripted"
        }

        async fn submit(&self) -> ProviderResult<Submission> {
            self.submits
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra submit")
        }

        async fn poll(&self, _handle: &JobHandle) -> ProviderResult<PollStatus> {
            match self.polls.lock().unwrap().pop_front() {
                Some(outcome) => outcome,
                None => Ok(self.last_poll.clone()),
            }
        }
    }

    fn running() -> PollStatus {
        PollStatus {
            state: JobState::Running,
            payload: serde_json::json!({ "status": "running" }),
        }
    }

    fn done(payload: serde_json::Value) -> PollStatus {
        PollStatus {
            state: JobState::Done,
            payload,
        }
    }

    fn test_config() -> DriverConfig {
        DriverConfig {
            poll_interval: Duration::from_secs(2),
            deadline: Duration::from_secs(600),
            max_submit_retries: 5,
            backoff: BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(60)),
        }
    }

    #[tokio::test]
    async fn test_concurrency_gate_then_success_observes_backoff_delays() {
        // Scenario: submit gated twice, then accepted, one poll to Done.
        let api = ScriptedApi::new(
            vec![
                Err(ProviderError::rate_limited("too many in flight")),
                Err(ProviderError::rate_limited("too many in flight")),
                Ok(Submission::Accepted(JobHandle::from_id("job-1"))),
            ],
            vec![Ok(done(serde_json::json!({ "video_url": "https://x/v.mp4" })))],
            running(),
        );

        let clock = Arc::new(ManualClock::new());
        let driver = JobDriver::with_clock(test_config(), clock.clone());

        let payload = driver.run(&api).await.unwrap();
        assert_eq!(payload["video_url"], "https://x/v.mp4");

        // Two exponential backoff delays, then one poll-interval sleep.
        let sleeps = clock.sleeps();
        assert_eq!(
            sleeps,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(2),
            ]
        );
    }

    #[tokio::test]
    async fn test_submit_retries_exhausted() {
        let gated = || Err(ProviderError::rate_limited("too many in flight"));
        let api = ScriptedApi::new(
            vec![gated(), gated(), gated(), gated()],
            vec![],
            running(),
        );

        let mut config = test_config();
        config.max_submit_retries = 3;
        let driver = JobDriver::with_clock(config, Arc::new(ManualClock::new()));

        let err = driver.run(&api).await.unwrap_err();
        match err {
            ProviderError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected RetriesExhausted, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_submit_error_fails_immediately() {
        let api = ScriptedApi::new(
            vec![Err(ProviderError::rejected(Some(400), "bad schema"))],
            vec![],
            running(),
        );

        let driver = JobDriver::with_clock(test_config(), Arc::new(ManualClock::new()));
        let err = driver.run(&api).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_job_stuck_running_times_out() {
        // Scenario: status never leaves Running; the deadline must fire.
        let api = ScriptedApi::new(
            vec![Ok(Submission::Accepted(JobHandle::from_id("job-2")))],
            vec![],
            running(),
        );

        let mut config = test_config();
        config.deadline = Duration::from_secs(10);
        let clock = Arc::new(ManualClock::new());
        let driver = JobDriver::with_clock(config, clock.clone());

        let err = driver.run(&api).await.unwrap_err();
        match err {
            ProviderError::Timeout { limit } => assert_eq!(limit, Duration::from_secs(10)),
            other => panic!("expected Timeout, got {other}"),
        }

        // Every sleep was a fixed poll interval; backoff never touched it.
        assert!(clock.sleeps().iter().all(|d| *d == Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_done_with_unextractable_payload_is_malformed() {
        // Scenario: terminal Done but no artifact anywhere in the payload.
        let api = ScriptedApi::new(
            vec![Ok(Submission::Accepted(JobHandle::from_id("job-3")))],
            vec![Ok(done(serde_json::json!({ "status": "done", "note": "odd shape" })))],
            running(),
        );

        let driver = JobDriver::with_clock(test_config(), Arc::new(ManualClock::new()));
        let payload = driver.run(&api).await.unwrap();

        let err = crate::extract::require_artifact_url(&payload).unwrap_err();
        match err {
            ProviderError::MalformedResponse { payload, .. } => {
                assert!(payload.contains("odd shape"));
            }
            other => panic!("expected MalformedResponse, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_backend_reported_failure_carries_payload() {
        let api = ScriptedApi::new(
            vec![Ok(Submission::Accepted(JobHandle::from_id("job-4")))],
            vec![Ok(PollStatus {
                state: JobState::Failed,
                payload: serde_json::json!({ "status": "failed", "error": "face not detected" }),
            })],
            running(),
        );

        let driver = JobDriver::with_clock(test_config(), Arc::new(ManualClock::new()));
        let err = driver.run(&api).await.unwrap_err();
        match err {
            ProviderError::JobFailed { detail } => assert!(detail.contains("face not detected")),
            other => panic!("expected JobFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_transient_poll_errors_are_retried_in_place() {
        let api = ScriptedApi::new(
            vec![Ok(Submission::Accepted(JobHandle::from_id("job-5")))],
            vec![
                Err(ProviderError::upstream("502 from status endpoint")),
                Ok(running()),
                Err(ProviderError::transport("connection reset")),
                Ok(done(serde_json::json!({ "url": "https://x/v.mp4" }))),
            ],
            running(),
        );

        let driver = JobDriver::with_clock(test_config(), Arc::new(ManualClock::new()));
        let payload = driver.run(&api).await.unwrap();
        assert_eq!(payload["url"], "https://x/v.mp4");
    }

    #[tokio::test]
    async fn test_immediate_submission_skips_polling() {
        let api = ScriptedApi::new(
            vec![Ok(Submission::Immediate(
                serde_json::json!({ "video": { "url": "https://x/v.mp4" } }),
            ))],
            vec![],
            running(),
        );

        let clock = Arc::new(ManualClock::new());
        let driver = JobDriver::with_clock(test_config(), clock.clone());

        let payload = driver.run(&api).await.unwrap();
        assert_eq!(payload["video"]["url"], "https://x/v.mp4");
        assert!(clock.sleeps().is_empty());
    }
}
