//! Environment-driven configuration.
//!
//! Credentials and per-backend tunables (base URL, timeouts, poll interval,
//! retry ceilings) are read once at startup. A backend registers only when
//! its required credentials are present; request parameters never travel
//! through the environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use hcast_providers::backends::{
    DidBackend, DidConfig, FalQueueBackend, FalQueueConfig, InfiniteTalkBackend,
    InfiniteTalkConfig, RunPodBackend, RunPodConfig, Wav2LipBackend, Wav2LipConfig,
};
use hcast_providers::{BackoffPolicy, DriverConfig, ProviderRegistry, ProviderResult};
use hcast_tts::PiperEngine;

/// Piper engine settings.
#[derive(Debug, Clone)]
pub struct PiperSettings {
    pub binary: PathBuf,
    pub voice_path: PathBuf,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub piper: PiperSettings,
    pub wav2lip: Wav2LipConfig,
    pub infinitetalk: Option<InfiniteTalkConfig>,
    pub runpod: Option<RunPodConfig>,
    pub fal: Option<FalQueueConfig>,
    pub did: Option<DidConfig>,
    /// Root for per-request scratch dirs; system temp when unset.
    pub work_root: Option<PathBuf>,
}

impl AppConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            work_root: std::env::var("HEADCAST_WORK_DIR").ok().map(PathBuf::from),
            piper: PiperSettings {
                binary: PathBuf::from(env_or("PIPER_BIN", "/opt/piper/piper")),
                voice_path: PathBuf::from(env_or(
                    "PIPER_VOICE",
                    "/opt/piper/voices/en_US-amy-medium.onnx",
                )),
            },
            wav2lip: Wav2LipConfig {
                checkpoint: PathBuf::from(env_or(
                    "WAV2LIP_CHECKPOINT",
                    "/models/wav2lip/wav2lip_gan.pth",
                )),
                repo_dir: PathBuf::from(env_or("WAV2LIP_REPO_DIR", "/app/Wav2Lip")),
                python_bin: env_or("WAV2LIP_PYTHON", "python"),
            },
            infinitetalk: std::env::var("INFINITALK_API_KEY").ok().map(|api_key| {
                InfiniteTalkConfig {
                    base_url: env_or("INFINITALK_BASE", "https://api.infinitetalk.net"),
                    driver: DriverConfig {
                        poll_interval: env_secs("INFINITALK_POLL_EVERY", 2),
                        deadline: env_secs("INFINITALK_TIMEOUT_S", 600),
                        ..DriverConfig::default()
                    },
                    ..InfiniteTalkConfig::new(api_key)
                }
            }),
            runpod: std::env::var("RUNPOD_API_KEY").ok().map(|api_key| {
                let endpoint = env_or("RUNPOD_ENDPOINT", "InfiniteTalk");
                RunPodConfig {
                    base_url: env_or("RUNPOD_BASE", "https://api.runpod.ai"),
                    driver: DriverConfig {
                        poll_interval: env_secs("RUNPOD_POLL_EVERY", 2),
                        deadline: env_secs("RUNPOD_TIMEOUT_S", 600),
                        ..DriverConfig::default()
                    },
                    ..RunPodConfig::new(api_key, endpoint)
                }
            }),
            fal: std::env::var("FAL_API_KEY")
                .or_else(|_| std::env::var("FAL_KEY"))
                .ok()
                .map(|api_key| FalQueueConfig {
                    endpoint: env_or("FAL_VEO3_ENDPOINT", "fal-ai/veo3"),
                    queue_base: env_or("FAL_QUEUE_BASE", "https://queue.fal.run"),
                    request_timeout: env_secs("FAL_REQ_TIMEOUT", 45),
                    response_grace: env_secs("FAL_RESPONSE_GRACE", 60),
                    driver: DriverConfig {
                        poll_interval: env_secs_f("FAL_POLL_EVERY", 2.0),
                        deadline: env_secs("FAL_TIMEOUT", 1800),
                        max_submit_retries: env_parse("FAL_MAX_SUBMIT_RETRIES", 30),
                        backoff: BackoffPolicy::new(
                            env_secs("FAL_CONC_BACKOFF_S", 5),
                            env_secs("FAL_CONC_BACKOFF_MAX", 60),
                        ),
                    },
                    ..FalQueueConfig::new(api_key)
                }),
            did: std::env::var("D_ID_API_KEY").ok().map(|api_key| DidConfig {
                voice_id: env_or("DID_VOICE", "en-US-GuyNeural"),
                voice_provider: env_or("DID_VOICE_PROVIDER", "microsoft"),
                strip_ssml: env_or("DID_USE_SSML", "0") == "1",
                driver_url: std::env::var("DID_DRIVER_URL").ok(),
                ..DidConfig::new(api_key)
            }),
        }
    }

    /// Build the provider registry from whatever is configured.
    pub fn build_registry(&self) -> ProviderResult<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();

        registry.register(Arc::new(Wav2LipBackend::new(self.wav2lip.clone())));

        if let Some(config) = &self.infinitetalk {
            registry.register(Arc::new(InfiniteTalkBackend::new(config.clone())?));
        }
        if let Some(config) = &self.runpod {
            registry.register(Arc::new(RunPodBackend::new(config.clone())?));
        }
        if let Some(config) = &self.fal {
            registry.register(Arc::new(FalQueueBackend::new(config.clone())?));
        }
        if let Some(config) = &self.did {
            registry.register(Arc::new(DidBackend::new(config.clone())?));
        }

        info!("registered backends: {}", registry.names().join(", "));
        Ok(registry)
    }

    /// Build the TTS engine.
    pub fn build_tts(&self) -> PiperEngine {
        PiperEngine::new(&self.piper.binary, &self.piper.voice_path)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_parse(key, default))
}

fn env_secs_f(key: &str, default: f64) -> Duration {
    Duration::from_secs_f64(env_parse(key, default))
}
