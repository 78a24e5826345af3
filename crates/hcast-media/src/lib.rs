//! FFmpeg CLI wrapper for the Headcast pipeline.
//!
//! Thin async wrappers over the `ffmpeg`/`ffprobe` binaries: a command
//! builder and runner, media probing, and the audio-mux post-processing step
//! used when a text-to-video backend returns a silent clip.

pub mod command;
pub mod error;
pub mod mux;
pub mod probe;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use mux::mux_audio;
pub use probe::{has_audio_track, probe_media, MediaInfo};
