//! Installation configuration.
//!
//! Loaded in layers: serde defaults, then an optional TOML file, then `PANGOOL__*`
//! environment variables. Change binaries, voices and bounds without code edits.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | PANGOOL_CONFIG | config/pangool | Path (with or without `.toml`) of the config file. |
//! | PANGOOL__SERVER__PORT | 8000 | HTTP port for the gateway. |
//! | PANGOOL__INFERENCE__BASE_URL | http://localhost:11434 | Ollama-compatible backend. |
//! | PANGOOL__INFERENCE__TOKEN_MODE | fragment | `fragment` or `character`. |
//! | PANGOOL__SYNTHESIS__PIPER_VOICE | voices/en_US-lessac-medium.onnx | Piper voice model. |
//! | PANGOOL__PLAYBACK__PLAYER_BIN | afplay | Audio output executable. |
//! | PANGOOL__TRANSCRIPTION__MODEL_PATH | models/ggml-tiny.bin | Whisper model file. |

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_CONFIG_PATH: &str = "PANGOOL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/pangool";

/// Top-level configuration shared by the gateway and the voice pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PangoolConfig {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub synthesis: SynthesisConfig,
    pub playback: PlaybackConfig,
    pub transcription: TranscriptionConfig,
    pub logging: LoggingConfig,
}

impl PangoolConfig {
    /// Load config from file and environment. Precedence: env `PANGOOL_CONFIG` path > `config/pangool` > defaults.
    pub fn load() -> CoreResult<Self> {
        let path = std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Some(Path::new(&path)))
    }

    /// Load from an explicit file (skipped when missing) plus the environment.
    pub fn load_from(path: Option<&Path>) -> CoreResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            let with_ext = path.with_extension("toml");
            if path.is_file() {
                builder = builder.add_source(config::File::from(path));
            } else if with_ext.is_file() {
                builder = builder.add_source(config::File::from(with_ext));
            }
        }

        let built = builder
            .add_source(
                config::Environment::with_prefix("PANGOOL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would make a bounded operation unbounded or nonsensical.
    pub fn validate(&self) -> CoreResult<()> {
        let bounds = [
            ("inference.connect_timeout_secs", self.inference.connect_timeout_secs),
            ("inference.idle_timeout_secs", self.inference.idle_timeout_secs),
            ("synthesis.primary_timeout_secs", self.synthesis.primary_timeout_secs),
            ("synthesis.fallback_timeout_secs", self.synthesis.fallback_timeout_secs),
            ("synthesis.convert_timeout_secs", self.synthesis.convert_timeout_secs),
            ("transcription.timeout_secs", self.transcription.timeout_secs),
            ("transcription.convert_timeout_secs", self.transcription.convert_timeout_secs),
        ];
        if let Some((name, _)) = bounds.iter().find(|(_, v)| *v == 0) {
            return Err(CoreError::Config(format!("{} must be greater than zero", name)));
        }
        if self.transcription.vad_mode > 3 {
            return Err(CoreError::Config(format!(
                "transcription.vad_mode must be 0-3, got {}",
                self.transcription.vad_mode
            )));
        }
        if !(0.0..=2.0).contains(&self.inference.temperature) {
            return Err(CoreError::Config(format!(
                "inference.temperature must be within 0.0..=2.0, got {}",
                self.inference.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.inference.top_p) {
            return Err(CoreError::Config(format!(
                "inference.top_p must be within 0.0..=1.0, got {}",
                self.inference.top_p
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Built tablet frontend. Served only when the directory exists.
    pub frontend_dist: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            frontend_dist: PathBuf::from("frontend/dist"),
        }
    }
}

/// How backend chunks are cut into outward `Token` events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenMode {
    /// One token per (filtered) backend chunk.
    #[default]
    Fragment,
    /// One token per character, after marker filtering.
    Character,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
    pub connect_timeout_secs: u64,
    /// Longest gap tolerated between two backend chunks.
    pub idle_timeout_secs: u64,
    pub token_mode: TokenMode,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "pangool".to_string(),
            temperature: 0.8,
            top_p: 0.9,
            num_predict: 200,
            connect_timeout_secs: 10,
            idle_timeout_secs: 60,
            token_mode: TokenMode::Fragment,
        }
    }
}

impl InferenceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Where WAV artifacts (and intermediate AIFF files) are written.
    pub artifact_dir: PathBuf,
    pub piper_bin: String,
    pub piper_voice: PathBuf,
    pub say_bin: String,
    pub afconvert_bin: String,
    pub primary_timeout_secs: u64,
    pub fallback_timeout_secs: u64,
    pub convert_timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            artifact_dir: std::env::temp_dir(),
            piper_bin: "piper".to_string(),
            piper_voice: PathBuf::from("voices/en_US-lessac-medium.onnx"),
            say_bin: "say".to_string(),
            afconvert_bin: "afconvert".to_string(),
            primary_timeout_secs: 30,
            fallback_timeout_secs: 30,
            convert_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub player_bin: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            player_bin: "afplay".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// ggml Whisper model. The tiny variant keeps latency low on the installation host.
    pub model_path: PathBuf,
    pub language: String,
    /// Drop non-speech frames before recognition.
    pub vad_filter: bool,
    /// WebRTC VAD aggressiveness, 0 (quality) to 3 (very aggressive).
    pub vad_mode: u8,
    /// Bound on one whole transcription: engine load, conversion, decode and recognition.
    pub timeout_secs: u64,
    /// Uploads and converted audio are staged here and removed after every attempt.
    pub staging_dir: PathBuf,
    /// Converts non-WAV uploads (browser WebM/Opus) to 16 kHz mono WAV.
    pub ffmpeg_bin: String,
    pub convert_timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-tiny.bin"),
            language: "en".to_string(),
            vad_filter: true,
            vad_mode: 3,
            timeout_secs: 60,
            staging_dir: std::env::temp_dir(),
            ffmpeg_bin: "ffmpeg".to_string(),
            convert_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_prefix: "pangool.log".to_string(),
        }
    }
}
