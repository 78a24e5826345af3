//! Generation backend clients and the job lifecycle engine.
//!
//! This crate is the orchestration core: a capability-based `VideoBackend`
//! abstraction over heterogeneous generation services (local subprocess
//! models, synchronous HTTP APIs, asynchronous submit/poll job APIs), plus
//! the machinery they share:
//!
//! - [`registry::ProviderRegistry`] — name/capability routing, checked
//!   before any I/O
//! - [`lifecycle::JobDriver`] — submit → poll → terminal state machine with
//!   deadline enforcement and an injectable clock
//! - [`backoff::BackoffPolicy`] — deterministic exponential backoff for
//!   rate-limited submits
//! - [`extract`] — artifact extraction from loosely-structured responses

pub mod backends;
pub mod backoff;
pub mod error;
pub mod extract;
pub mod http;
pub mod lifecycle;
pub mod provider;
pub mod registry;

pub use backoff::{Backoff, BackoffPolicy};
pub use error::{ProviderError, ProviderResult, TransientKind};
pub use extract::{extract_artifact_url, require_artifact_url};
pub use lifecycle::{Clock, DriverConfig, JobApi, JobDriver, JobHandle, PollStatus, Submission, TokioClock};
pub use provider::{LipSyncInput, TextToVideoInput, VideoBackend};
pub use registry::ProviderRegistry;
