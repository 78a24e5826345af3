//! Headcast CLI: one generation request per invocation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hcast_models::{Capability, GenerationRequest, InputSource, OutputHints};
use hcast_pipeline::{AppConfig, SpeakPipeline};

#[derive(Debug, Parser)]
#[command(name = "headcast", about = "Turn a face image and a line of text into a talking-head video")]
struct Args {
    /// Text to speak (or the text-to-video prompt)
    #[arg(long)]
    text: String,

    /// Face image: local file or already hosted URL
    #[arg(long)]
    face: Option<String>,

    /// Pre-rendered waveform: local file or hosted URL (synthesized from
    /// text when omitted)
    #[arg(long)]
    audio: Option<String>,

    /// Backend to route to
    #[arg(long, default_value = "wav2lip")]
    backend: String,

    /// Capability: lip_sync or text_to_video
    #[arg(long, default_value = "lip_sync")]
    capability: String,

    /// Voice hint for speech synthesis
    #[arg(long)]
    voice: Option<String>,

    /// Frame rate for lip-sync renders
    #[arg(long, default_value_t = 25)]
    fps: u32,

    /// Square frame size for lip-sync renders
    #[arg(long, default_value_t = 512)]
    size: u32,

    /// Aspect ratio for text-to-video renders
    #[arg(long, default_value = "16:9")]
    aspect_ratio: String,

    /// Duration in seconds for text-to-video renders
    #[arg(long, default_value_t = 8)]
    duration: u32,

    /// Resolution tier for text-to-video renders
    #[arg(long, default_value = "720p")]
    resolution: String,

    /// Where to write the video
    #[arg(long, default_value = "result.mp4")]
    output: PathBuf,

    /// Also write the intermediate waveform here
    #[arg(long)]
    audio_output: Option<PathBuf>,
}

fn parse_source(value: &str) -> InputSource {
    if value.starts_with("http://") || value.starts_with("https://") {
        InputSource::url(value)
    } else {
        InputSource::path(value)
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("hcast=info".parse().expect("static directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let capability = match args.capability.as_str() {
        "lip_sync" => Capability::LipSync,
        "text_to_video" => Capability::TextToVideo,
        other => anyhow::bail!("unknown capability '{other}' (expected lip_sync or text_to_video)"),
    };

    let config = AppConfig::from_env();
    let registry = config
        .build_registry()
        .context("failed to build provider registry")?;
    let tts = Arc::new(config.build_tts());

    let mut request = GenerationRequest::new(&args.backend, capability, &args.text).with_hints(
        OutputHints {
            fps: args.fps,
            size: args.size,
            aspect_ratio: args.aspect_ratio.clone(),
            duration_secs: args.duration,
            resolution: args.resolution.clone(),
            generate_audio: true,
        },
    );
    if let Some(face) = &args.face {
        request = request.with_face(parse_source(face));
    }
    if let Some(audio) = &args.audio {
        request = request.with_audio(parse_source(audio));
    }
    if let Some(voice) = &args.voice {
        request = request.with_voice(voice);
    }

    let mut pipeline = SpeakPipeline::new(tts, Arc::new(registry));
    if let Some(work_root) = &config.work_root {
        pipeline = pipeline.with_work_root(work_root);
    }
    let output = pipeline
        .run(&request)
        .await
        .context("generation failed")?;

    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }

    tokio::fs::write(&args.output, &output.video)
        .await
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("wrote {} ({} bytes)", args.output.display(), output.video.len());

    if let (Some(path), Some(audio)) = (&args.audio_output, &output.audio) {
        tokio::fs::write(path, audio)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {} ({} bytes)", path.display(), audio.len());
    }

    Ok(())
}
