//! The speak pipeline: request in, talking-head video out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use hcast_media::MediaResult;
use hcast_models::{Capability, CapabilitySet, GenerationRequest, InputSource};
use hcast_providers::{LipSyncInput, ProviderRegistry, TextToVideoInput};
use hcast_tts::TtsEngine;

use crate::error::{PipelineError, PipelineResult};

/// Post-processing seam: audio-track probing and muxing.
///
/// A trait so tests exercise the warning path without a real FFmpeg.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// True when the video has no audio track and needs one muxed on.
    async fn needs_audio(&self, video: &Path) -> MediaResult<bool>;

    /// Mux `audio` onto `video`, writing to `out`.
    async fn mux(&self, video: &Path, audio: &Path, out: &Path) -> MediaResult<()>;
}

/// FFmpeg-backed implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegMuxer;

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn needs_audio(&self, video: &Path) -> MediaResult<bool> {
        Ok(!hcast_media::has_audio_track(video).await?)
    }

    async fn mux(&self, video: &Path, audio: &Path, out: &Path) -> MediaResult<()> {
        hcast_media::mux_audio(video, audio, out).await
    }
}

/// Everything a caller gets back: the video, the intermediate waveform when
/// one exists locally, and any non-fatal warnings collected on the way.
#[derive(Debug)]
pub struct SpeakOutput {
    pub video: Vec<u8>,
    pub audio: Option<Vec<u8>>,
    /// Whether the synthesized waveform was muxed onto the video.
    pub mux_applied: bool,
    pub warnings: Vec<String>,
}

pub struct SpeakPipeline {
    tts: Arc<dyn TtsEngine>,
    registry: Arc<ProviderRegistry>,
    muxer: Arc<dyn Muxer>,
    work_root: Option<PathBuf>,
}

impl SpeakPipeline {
    pub fn new(tts: Arc<dyn TtsEngine>, registry: Arc<ProviderRegistry>) -> Self {
        Self::with_muxer(tts, registry, Arc::new(FfmpegMuxer))
    }

    pub fn with_muxer(
        tts: Arc<dyn TtsEngine>,
        registry: Arc<ProviderRegistry>,
        muxer: Arc<dyn Muxer>,
    ) -> Self {
        Self {
            tts,
            registry,
            muxer,
            work_root: None,
        }
    }

    /// Root directory for per-request scratch dirs (system temp when unset).
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    fn make_workdir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("headcast_");
        match &self.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }

    /// Run one generation request to completion.
    ///
    /// Per-request scratch space lives in a temp dir that is removed on
    /// every exit path; artifact bytes are read out before it drops.
    pub async fn run(&self, request: &GenerationRequest) -> PipelineResult<SpeakOutput> {
        let request_id = Uuid::new_v4();
        info!(
            request_id = %request_id,
            backend = %request.backend,
            capability = %request.capability,
            "generation started"
        );

        self.validate(request)?;

        // Routing happens before the TTS subprocess or any network call, so
        // capability errors stay local and side-effect free.
        let backend = self
            .registry
            .resolve(&request.backend, &CapabilitySet::from(request.capability))?;

        let work = self.make_workdir()?;
        let mut warnings = Vec::new();

        let waveform = self.prepare_waveform(request, work.path()).await?;
        let video_path = work.path().join("result.mp4");

        let (final_video, mux_applied) = match request.capability {
            Capability::LipSync => {
                let face = request.face.clone().ok_or_else(|| {
                    PipelineError::invalid_request("lip_sync requires a face image")
                })?;
                let input = LipSyncInput {
                    face,
                    audio: Some(waveform.as_input()),
                    text: request.text.clone(),
                    voice: request.voice.clone(),
                    hints: request.hints.clone(),
                };
                backend.lip_sync(&input, &video_path).await?;
                (video_path, false)
            }
            Capability::TextToVideo => {
                let input = TextToVideoInput {
                    prompt: request.text.clone(),
                    reference_image: request.face.clone(),
                    hints: request.hints.clone(),
                };
                backend.text_to_video(&input, &video_path).await?;
                self.narrate(&video_path, &waveform, work.path(), &mut warnings)
                    .await
            }
        };

        let video = tokio::fs::read(&final_video).await?;
        let audio = match waveform.local_path() {
            Some(path) => Some(tokio::fs::read(path).await?),
            None => None,
        };

        info!(
            request_id = %request_id,
            video_bytes = video.len(),
            mux_applied,
            "generation finished"
        );

        Ok(SpeakOutput {
            video,
            audio,
            mux_applied,
            warnings,
        })
    }

    fn validate(&self, request: &GenerationRequest) -> PipelineResult<()> {
        if request.text.trim().is_empty() {
            return Err(PipelineError::invalid_request("text must not be empty"));
        }
        if request.capability == Capability::LipSync && request.face.is_none() {
            return Err(PipelineError::invalid_request(
                "lip_sync requires a face image",
            ));
        }
        if let Some(InputSource::Path(path)) = &request.face {
            if !path.is_file() {
                return Err(PipelineError::invalid_request(format!(
                    "face image not found: {}",
                    path.display()
                )));
            }
        }
        if let Some(InputSource::Path(path)) = &request.audio {
            if !path.is_file() {
                return Err(PipelineError::invalid_request(format!(
                    "audio not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Ensure a waveform exists when the request needs one; synthesize from
    /// text when none was supplied.
    async fn prepare_waveform(
        &self,
        request: &GenerationRequest,
        work: &Path,
    ) -> PipelineResult<Waveform> {
        if let Some(audio) = &request.audio {
            return Ok(Waveform::Supplied(audio.clone()));
        }

        let out_wav = work.join("speech.wav");
        self.tts
            .synthesize(&request.text, request.voice.as_deref(), &out_wav)
            .await?;
        Ok(Waveform::Synthesized(out_wav))
    }

    /// Mux the waveform onto a silent text-to-video result. Failure is a
    /// warning, never an error: the un-muxed video is still returned.
    async fn narrate(
        &self,
        video_path: &Path,
        waveform: &Waveform,
        work: &Path,
        warnings: &mut Vec<String>,
    ) -> (PathBuf, bool) {
        let Some(wav) = waveform.local_path() else {
            return (video_path.to_path_buf(), false);
        };

        match self.muxer.needs_audio(video_path).await {
            Ok(false) => (video_path.to_path_buf(), false),
            Ok(true) => {
                let muxed = work.join("muxed.mp4");
                match self.muxer.mux(video_path, wav, &muxed).await {
                    Ok(()) => (muxed, true),
                    Err(e) => {
                        warn!("audio mux failed, returning silent video: {e}");
                        warnings.push(format!("audio mux failed: {e}"));
                        (video_path.to_path_buf(), false)
                    }
                }
            }
            Err(e) => {
                warn!("could not probe video for an audio track: {e}");
                warnings.push(format!("audio probe failed: {e}"));
                (video_path.to_path_buf(), false)
            }
        }
    }
}

/// Where the request's waveform came from.
enum Waveform {
    Supplied(InputSource),
    Synthesized(PathBuf),
}

impl Waveform {
    fn as_input(&self) -> InputSource {
        match self {
            Waveform::Supplied(source) => source.clone(),
            Waveform::Synthesized(path) => InputSource::Path(path.clone()),
        }
    }

    fn local_path(&self) -> Option<&Path> {
        match self {
            Waveform::Supplied(source) => source.as_path(),
            Waveform::Synthesized(path) => Some(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use hcast_media::MediaError;
    use hcast_models::{CapabilitySet, OutputHints, ResultArtifact};
    use hcast_providers::{ProviderResult, VideoBackend};
    use hcast_tts::TtsResult;

    struct FakeTts {
        calls: AtomicUsize,
    }

    impl FakeTts {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TtsEngine for FakeTts {
        fn name(&self) -> &'static str {
            "fake-tts"
        }

        async fn synthesize(
            &self,
            _text: &str,
            _voice: Option<&str>,
            out_wav: &Path,
        ) -> TtsResult<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(out_wav, b"RIFF-fake-wav").await?;
            Ok(out_wav.to_path_buf())
        }
    }

    struct FakeBackend {
        caps: CapabilitySet,
        seen_out: Mutex<Option<PathBuf>>,
    }

    impl FakeBackend {
        fn lip_sync() -> Self {
            Self {
                caps: CapabilitySet::from(Capability::LipSync),
                seen_out: Mutex::new(None),
            }
        }

        fn text_to_video() -> Self {
            Self {
                caps: CapabilitySet::from(Capability::TextToVideo),
                seen_out: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl VideoBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn capabilities(&self) -> CapabilitySet {
            self.caps.clone()
        }

        async fn lip_sync(
            &self,
            _input: &LipSyncInput,
            out_mp4: &Path,
        ) -> ProviderResult<ResultArtifact> {
            tokio::fs::write(out_mp4, b"fake-lipsync-video").await?;
            *self.seen_out.lock().unwrap() = Some(out_mp4.to_path_buf());
            Ok(ResultArtifact::video(out_mp4))
        }

        async fn text_to_video(
            &self,
            _input: &TextToVideoInput,
            out_mp4: &Path,
        ) -> ProviderResult<ResultArtifact> {
            tokio::fs::write(out_mp4, b"fake-silent-video").await?;
            *self.seen_out.lock().unwrap() = Some(out_mp4.to_path_buf());
            Ok(ResultArtifact::video(out_mp4))
        }
    }

    /// Muxer whose behavior is scripted per test.
    struct FakeMuxer {
        needs_audio: bool,
        fail_mux: bool,
    }

    #[async_trait]
    impl Muxer for FakeMuxer {
        async fn needs_audio(&self, _video: &Path) -> MediaResult<bool> {
            Ok(self.needs_audio)
        }

        async fn mux(&self, video: &Path, audio: &Path, out: &Path) -> MediaResult<()> {
            if self.fail_mux {
                return Err(MediaError::ffmpeg_failed("scripted failure", None, Some(1)));
            }
            let mut bytes = tokio::fs::read(video).await?;
            bytes.extend_from_slice(b"+");
            bytes.extend_from_slice(&tokio::fs::read(audio).await?);
            tokio::fs::write(out, bytes).await?;
            Ok(())
        }
    }

    fn pipeline_with(
        backend: Arc<FakeBackend>,
        tts: Arc<FakeTts>,
        muxer: FakeMuxer,
    ) -> SpeakPipeline {
        let mut registry = ProviderRegistry::new();
        registry.register(backend);
        SpeakPipeline::with_muxer(tts, Arc::new(registry), Arc::new(muxer))
    }

    fn lip_sync_request(face: &Path) -> GenerationRequest {
        GenerationRequest::new("fake", Capability::LipSync, "hello world")
            .with_face(InputSource::path(face))
            .with_hints(OutputHints::default())
    }

    #[tokio::test]
    async fn test_lip_sync_happy_path_synthesizes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let face = dir.path().join("face.png");
        std::fs::write(&face, b"png").unwrap();

        let backend = Arc::new(FakeBackend::lip_sync());
        let tts = Arc::new(FakeTts::new());
        let pipeline = pipeline_with(
            backend.clone(),
            tts.clone(),
            FakeMuxer {
                needs_audio: false,
                fail_mux: false,
            },
        );

        let output = pipeline.run(&lip_sync_request(&face)).await.unwrap();

        assert_eq!(output.video, b"fake-lipsync-video");
        assert_eq!(output.audio.as_deref(), Some(&b"RIFF-fake-wav"[..]));
        assert_eq!(tts.calls.load(Ordering::SeqCst), 1);
        assert!(!output.mux_applied);
        assert!(output.warnings.is_empty());

        // The request-scoped workdir is gone once the bytes are out.
        let out_path = backend.seen_out.lock().unwrap().clone().unwrap();
        assert!(!out_path.exists());
        assert!(!out_path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_supplied_waveform_skips_tts() {
        let dir = tempfile::tempdir().unwrap();
        let face = dir.path().join("face.png");
        let wav = dir.path().join("mine.wav");
        std::fs::write(&face, b"png").unwrap();
        std::fs::write(&wav, b"my-own-wav").unwrap();

        let tts = Arc::new(FakeTts::new());
        let pipeline = pipeline_with(
            Arc::new(FakeBackend::lip_sync()),
            tts.clone(),
            FakeMuxer {
                needs_audio: false,
                fail_mux: false,
            },
        );

        let request = lip_sync_request(&face).with_audio(InputSource::path(&wav));
        let output = pipeline.run(&request).await.unwrap();

        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
        assert_eq!(output.audio.as_deref(), Some(&b"my-own-wav"[..]));
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_anything_runs() {
        let tts = Arc::new(FakeTts::new());
        let pipeline = pipeline_with(
            Arc::new(FakeBackend::lip_sync()),
            tts.clone(),
            FakeMuxer {
                needs_audio: false,
                fail_mux: false,
            },
        );

        let request = GenerationRequest::new("fake", Capability::LipSync, "   ");
        let err = pipeline.run(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_face_rejected_for_lip_sync() {
        let pipeline = pipeline_with(
            Arc::new(FakeBackend::lip_sync()),
            Arc::new(FakeTts::new()),
            FakeMuxer {
                needs_audio: false,
                fail_mux: false,
            },
        );

        let request = GenerationRequest::new("fake", Capability::LipSync, "hello");
        let err = pipeline.run(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_capability_mismatch_resolved_before_tts_runs() {
        let dir = tempfile::tempdir().unwrap();
        let face = dir.path().join("face.png");
        std::fs::write(&face, b"png").unwrap();

        // Registered backend only does text_to_video; request wants lip_sync.
        let tts = Arc::new(FakeTts::new());
        let pipeline = pipeline_with(
            Arc::new(FakeBackend::text_to_video()),
            tts.clone(),
            FakeMuxer {
                needs_audio: false,
                fail_mux: false,
            },
        );

        let err = pipeline.run(&lip_sync_request(&face)).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Provider(hcast_providers::ProviderError::CapabilityMismatch { .. })
        ));
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_backend_rejected() {
        let pipeline = pipeline_with(
            Arc::new(FakeBackend::lip_sync()),
            Arc::new(FakeTts::new()),
            FakeMuxer {
                needs_audio: false,
                fail_mux: false,
            },
        );

        let request = GenerationRequest::new("missing", Capability::TextToVideo, "hello");
        let err = pipeline.run(&request).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Provider(hcast_providers::ProviderError::UnknownBackend { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_text_to_video_gets_narration_muxed() {
        let pipeline = pipeline_with(
            Arc::new(FakeBackend::text_to_video()),
            Arc::new(FakeTts::new()),
            FakeMuxer {
                needs_audio: true,
                fail_mux: false,
            },
        );

        let request = GenerationRequest::new("fake", Capability::TextToVideo, "a calm lake");
        let output = pipeline.run(&request).await.unwrap();

        assert!(output.mux_applied);
        assert_eq!(output.video, b"fake-silent-video+RIFF-fake-wav");
        assert!(output.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_mux_failure_is_nonfatal_and_returns_silent_video() {
        let pipeline = pipeline_with(
            Arc::new(FakeBackend::text_to_video()),
            Arc::new(FakeTts::new()),
            FakeMuxer {
                needs_audio: true,
                fail_mux: true,
            },
        );

        let request = GenerationRequest::new("fake", Capability::TextToVideo, "a calm lake");
        let output = pipeline.run(&request).await.unwrap();

        assert!(!output.mux_applied);
        assert_eq!(output.video, b"fake-silent-video");
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("mux failed"));
    }

    #[tokio::test]
    async fn test_video_with_own_audio_is_left_alone() {
        let pipeline = pipeline_with(
            Arc::new(FakeBackend::text_to_video()),
            Arc::new(FakeTts::new()),
            FakeMuxer {
                needs_audio: false,
                fail_mux: false,
            },
        );

        let request = GenerationRequest::new("fake", Capability::TextToVideo, "a calm lake");
        let output = pipeline.run(&request).await.unwrap();

        assert!(!output.mux_applied);
        assert_eq!(output.video, b"fake-silent-video");
    }
}
