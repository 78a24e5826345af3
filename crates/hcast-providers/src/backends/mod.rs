//! Backend client implementations.
//!
//! Each module speaks one backend's wire protocol behind the shared
//! [`crate::provider::VideoBackend`] contract. Synchronous clients
//! (wav2lip) block until the artifact exists; asynchronous clients drive a
//! [`crate::lifecycle::JobDriver`] internally.

pub mod did;
pub mod fal_queue;
pub mod infinitetalk;
pub mod runpod;
pub mod wav2lip;

pub use did::{DidBackend, DidConfig};
pub use fal_queue::{FalQueueBackend, FalQueueConfig};
pub use infinitetalk::{InfiniteTalkBackend, InfiniteTalkConfig};
pub use runpod::{RunPodBackend, RunPodConfig};
pub use wav2lip::{Wav2LipBackend, Wav2LipConfig};
