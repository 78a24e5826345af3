//! Generation orchestration pipeline.
//!
//! Composes the TTS collaborator, the provider registry, and the optional
//! audio-mux post-processing step into one request → one artifact.

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{FfmpegMuxer, Muxer, SpeakOutput, SpeakPipeline};
