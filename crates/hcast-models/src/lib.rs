//! Shared data models for the Headcast generation backend.
//!
//! This crate provides Serde-serializable types for:
//! - Generation requests and output hints
//! - Backend capabilities
//! - Job records and canonical job states
//! - Result artifacts

pub mod artifact;
pub mod capability;
pub mod job;
pub mod request;

// Re-export common types
pub use artifact::{MediaKind, ResultArtifact};
pub use capability::{Capability, CapabilitySet};
pub use job::{Job, JobState};
pub use request::{GenerationRequest, InputSource, OutputHints};
