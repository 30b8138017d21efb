//! **Transcription gateway**: uploaded audio bytes in, recognized text (or nothing) out.
//!
//! The speech engine is loaded lazily on first use and cached for the life of the gateway.
//! A failed load is cached too: an installation without a model answers `None` on every
//! call without probing again. All failures collapse to `None` and are logged.
//!
//! Browsers record WebM/Opus. Anything that is not already a WAV is converted with ffmpeg
//! into the staging directory first. Staged and converted files are removed on every path,
//! including a timeout.

use crate::audio::{decode_wav_file, is_wav, ENGINE_SAMPLE_RATE};
use crate::error::{VoiceError, VoiceResult};
use crate::process::BoundedCommand;
use crate::vad::{VadConfig, VadDetector};
use pangool_core::TranscriptionConfig;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const STAGING_PREFIX: &str = "pangool-stt-";

/// A local speech recognizer. Input is 16 kHz mono PCM; output is the recognized segments.
pub trait SpeechEngine: Send + Sync {
    fn transcribe(&self, samples: &[f32]) -> VoiceResult<Vec<String>>;
}

type EngineLoader = Arc<dyn Fn() -> VoiceResult<Arc<dyn SpeechEngine>> + Send + Sync>;
type EngineSlot = Arc<OnceCell<Option<Arc<dyn SpeechEngine>>>>;

pub struct TranscriptionGateway {
    config: TranscriptionConfig,
    loader: EngineLoader,
    engine: EngineSlot,
}

impl TranscriptionGateway {
    /// Gateway backed by the local Whisper model at `config.model_path`.
    pub fn new(config: TranscriptionConfig) -> Self {
        let engine_config = config.clone();
        Self::with_loader(config, move || load_default_engine(&engine_config))
    }

    /// Gateway with a custom engine loader. The loader runs at most once.
    pub fn with_loader<F>(config: TranscriptionConfig, loader: F) -> Self
    where
        F: Fn() -> VoiceResult<Arc<dyn SpeechEngine>> + Send + Sync + 'static,
    {
        Self {
            config,
            loader: Arc::new(loader),
            engine: Arc::new(OnceCell::new()),
        }
    }

    /// The load runs in its own task, so a caller that gives up (timeout, dropped request)
    /// does not cancel it and later callers wait on the same attempt.
    async fn engine(&self) -> Option<Arc<dyn SpeechEngine>> {
        if let Some(slot) = self.engine.get() {
            return slot.clone();
        }
        let slot = Arc::clone(&self.engine);
        let loader = Arc::clone(&self.loader);
        let load = tokio::spawn(async move {
            let engine = slot
                .get_or_init(|| async move {
                    match tokio::task::spawn_blocking(move || (*loader)()).await {
                        Ok(Ok(engine)) => {
                            info!(target: "pangool::stt", "Speech engine loaded");
                            Some(engine)
                        }
                        Ok(Err(e)) => {
                            warn!(target: "pangool::stt", "Speech engine unavailable: {}", e);
                            None
                        }
                        Err(e) => {
                            warn!(target: "pangool::stt", "Speech engine load panicked: {}", e);
                            None
                        }
                    }
                })
                .await
                .clone();
            engine
        });
        match load.await {
            Ok(engine) => engine,
            Err(e) => {
                warn!(target: "pangool::stt", "Speech engine load task failed: {}", e);
                None
            }
        }
    }

    /// Whether an engine is loaded (loading it if this is the first call).
    pub async fn is_available(&self) -> bool {
        self.engine().await.is_some()
    }

    /// Recognize speech in `audio` (WAV, or anything ffmpeg can read). `None` for every
    /// failure and for silence.
    pub async fn transcribe(&self, audio: &[u8]) -> Option<String> {
        let limit = Duration::from_secs(self.config.timeout_secs);
        let attempt = async {
            let Some(engine) = self.engine().await else {
                return Err(VoiceError::Stt("no speech engine available".to_string()));
            };
            self.run(engine, audio).await
        };

        match tokio::time::timeout(limit, attempt).await {
            Ok(Ok(Some(text))) => {
                info!(target: "pangool::stt", chars = text.chars().count(), "Transcribed");
                Some(text)
            }
            Ok(Ok(None)) => {
                info!(target: "pangool::stt", "No speech recognized");
                None
            }
            Ok(Err(e)) => {
                warn!(target: "pangool::stt", "Transcription failed: {}", e);
                None
            }
            Err(_) => {
                warn!(target: "pangool::stt", "Transcription timed out after {}s", limit.as_secs());
                None
            }
        }
    }

    async fn run(&self, engine: Arc<dyn SpeechEngine>, audio: &[u8]) -> VoiceResult<Option<String>> {
        let needs_conversion = !is_wav(audio);
        let staged = self.stage(audio.to_vec(), if needs_conversion { ".upload" } else { ".wav" }).await?;

        let source = if needs_conversion {
            let converted = self.convert(&staged).await?;
            drop(staged);
            converted
        } else {
            staged
        };

        let vad = self.config.vad_filter.then(|| VadConfig {
            sample_rate: ENGINE_SAMPLE_RATE,
            mode: self.config.vad_mode,
        });

        let segments = tokio::task::spawn_blocking(move || -> VoiceResult<Vec<String>> {
            let samples = decode_wav_file(&source)?;
            // Staged copy is no longer needed once decoded
            drop(source);
            let samples = match vad {
                Some(config) => VadDetector::new(config)?.retain_speech(&samples)?,
                None => samples,
            };
            if samples.is_empty() {
                return Ok(Vec::new());
            }
            engine.transcribe(&samples)
        })
        .await
        .map_err(|e| VoiceError::Stt(format!("transcription task failed: {}", e)))??;

        Ok(join_segments(&segments))
    }

    /// Write the upload into the staging directory on the blocking pool.
    async fn stage(&self, audio: Vec<u8>, suffix: &'static str) -> VoiceResult<TempPath> {
        let dir = self.config.staging_dir.clone();
        tokio::task::spawn_blocking(move || -> VoiceResult<TempPath> {
            let mut staged = staging_file(&dir, suffix)?;
            staged.write_all(&audio)?;
            staged.flush()?;
            Ok(staged.into_temp_path())
        })
        .await
        .map_err(|e| VoiceError::Stt(format!("staging task failed: {}", e)))?
    }

    /// Convert a non-WAV upload to 16 kHz mono WAV next to it.
    async fn convert(&self, input: &TempPath) -> VoiceResult<TempPath> {
        let output = staging_file(&self.config.staging_dir, ".wav")?.into_temp_path();
        debug!(target: "pangool::stt", input = %input.display(), "Converting upload with ffmpeg");

        BoundedCommand::new(
            &self.config.ffmpeg_bin,
            Duration::from_secs(self.config.convert_timeout_secs),
        )
        .arg("-nostdin")
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(input.as_os_str())
        .arg("-ar")
        .arg(ENGINE_SAMPLE_RATE.to_string())
        .arg("-ac")
        .arg("1")
        .arg("-f")
        .arg("wav")
        .arg(output.as_os_str())
        .run()
        .await?;

        Ok(output)
    }
}

fn staging_file(dir: &Path, suffix: &str) -> VoiceResult<tempfile::NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(suffix)
        .tempfile_in(dir)?)
}

/// Trim each segment, join with single spaces, trim again. Empty result is `None`.
pub fn join_segments(segments: &[String]) -> Option<String> {
    let joined = segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let text = joined.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(feature = "whisper")]
fn load_default_engine(config: &TranscriptionConfig) -> VoiceResult<Arc<dyn SpeechEngine>> {
    let engine = whisper_engine::WhisperEngine::new(&config.model_path, &config.language)?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "whisper"))]
fn load_default_engine(_config: &TranscriptionConfig) -> VoiceResult<Arc<dyn SpeechEngine>> {
    Err(VoiceError::Config(
        "built without the `whisper` feature; transcription disabled".to_string(),
    ))
}

// -----------------------------------------------------------------------------
// Local Whisper STT (optional feature). Requires whisper.cpp/ggml.
// -----------------------------------------------------------------------------
#[cfg(feature = "whisper")]
mod whisper_engine {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Whisper on-device inference from a ggml model (tiny by default). One state, so calls
    /// are serialized.
    pub struct WhisperEngine {
        #[allow(dead_code)]
        context: WhisperContext,
        state: Mutex<whisper_rs::WhisperState>,
        language: String,
    }

    impl WhisperEngine {
        pub fn new(model_path: &Path, language: &str) -> VoiceResult<Self> {
            if !model_path.is_file() {
                return Err(VoiceError::Config(format!(
                    "Whisper model not found at {}",
                    model_path.display()
                )));
            }
            let path = model_path
                .to_str()
                .ok_or_else(|| VoiceError::Config("Whisper model path is not UTF-8".to_string()))?;
            let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
                .map_err(|e| VoiceError::Stt(format!("Whisper load failed: {}", e)))?;
            let state = context
                .create_state()
                .map_err(|e| VoiceError::Stt(format!("Whisper state init failed: {}", e)))?;
            Ok(Self {
                context,
                state: Mutex::new(state),
                language: language.to_string(),
            })
        }
    }

    impl SpeechEngine for WhisperEngine {
        fn transcribe(&self, samples: &[f32]) -> VoiceResult<Vec<String>> {
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_no_timestamps(true);
            params.set_language(Some(self.language.as_str()));

            let mut state = self
                .state
                .lock()
                .map_err(|e| VoiceError::Stt(format!("Whisper lock poisoned: {}", e)))?;
            state
                .full(params, samples)
                .map_err(|e| VoiceError::Stt(format!("Whisper inference failed: {}", e)))?;
            Ok(state
                .as_iter()
                .filter_map(|seg| seg.to_str().ok().map(|s| s.to_string()))
                .collect())
        }
    }
}

#[cfg(feature = "whisper")]
pub use whisper_engine::WhisperEngine;
