//! Audio muxing.
//!
//! Text-to-video backends don't guarantee a voice track; the pipeline muxes
//! the separately synthesized waveform onto the returned video. Video is
//! copied, audio is re-encoded to AAC, and the output is truncated to the
//! shorter of the two tracks.

use std::path::Path;

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Default timeout for a mux run; stream-copy muxes finish in seconds.
const MUX_TIMEOUT_SECS: u64 = 120;

/// Mux `audio` onto `video`, writing the result to `output`.
///
/// Replaces whatever audio the video carries: video stream from input 0,
/// audio stream from input 1, `-shortest`.
pub async fn mux_audio(
    video: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let video = video.as_ref();
    let audio = audio.as_ref();

    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }
    if !audio.exists() {
        return Err(MediaError::FileNotFound(audio.to_path_buf()));
    }

    debug!(
        "Muxing audio {} onto video {}",
        audio.display(),
        video.display()
    );

    let cmd = FfmpegCommand::new(video, output.as_ref())
        .input(audio)
        .map("0:v:0")
        .map("1:a:0")
        .video_codec("copy")
        .audio_codec("aac")
        .shortest();

    FfmpegRunner::new()
        .with_timeout(MUX_TIMEOUT_SECS)
        .run(&cmd)
        .await
}
