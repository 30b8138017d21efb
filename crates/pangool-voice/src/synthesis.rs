//! **Synthesis chain**: text to a WAV [`AudioArtifact`] through an ordered list of
//! strategies. Each strategy runs at most once; the first one that exits cleanly *and*
//! leaves the target file behind wins. When every strategy fails no file remains.
//!
//! Default order: Piper neural voice (only when its model file is installed), then the
//! platform `say` voice converted to 16-bit PCM WAV by `afconvert`.

use crate::artifact::AudioArtifact;
use crate::error::{VoiceError, VoiceResult};
use crate::process::BoundedCommand;
use pangool_core::SynthesisConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One way of rendering text into a WAV file at a given path.
#[async_trait::async_trait]
pub trait SynthesisStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap precondition check. Unavailable strategies are skipped, not failed.
    fn is_available(&self) -> bool {
        true
    }

    async fn render(&self, text: &str, target: &Path) -> VoiceResult<()>;
}

/// Piper neural TTS: text on stdin, WAV written to `--output_file`.
#[derive(Debug, Clone)]
pub struct PiperStrategy {
    bin: String,
    voice: PathBuf,
    limit: Duration,
}

impl PiperStrategy {
    pub fn new(bin: impl Into<String>, voice: impl Into<PathBuf>, limit: Duration) -> Self {
        Self {
            bin: bin.into(),
            voice: voice.into(),
            limit,
        }
    }
}

#[async_trait::async_trait]
impl SynthesisStrategy for PiperStrategy {
    fn name(&self) -> &'static str {
        "piper"
    }

    fn is_available(&self) -> bool {
        self.voice.is_file()
    }

    async fn render(&self, text: &str, target: &Path) -> VoiceResult<()> {
        BoundedCommand::new(&self.bin, self.limit)
            .arg("--model")
            .arg(&self.voice)
            .arg("--output_file")
            .arg(target)
            .stdin_text(text)
            .run()
            .await
    }
}

/// Platform voice: `say` renders AIFF, `afconvert` turns it into LEI16 WAV at 22.05 kHz.
#[derive(Debug, Clone)]
pub struct SayStrategy {
    say_bin: String,
    afconvert_bin: String,
    say_limit: Duration,
    convert_limit: Duration,
}

impl SayStrategy {
    pub fn new(
        say_bin: impl Into<String>,
        afconvert_bin: impl Into<String>,
        say_limit: Duration,
        convert_limit: Duration,
    ) -> Self {
        Self {
            say_bin: say_bin.into(),
            afconvert_bin: afconvert_bin.into(),
            say_limit,
            convert_limit,
        }
    }
}

#[async_trait::async_trait]
impl SynthesisStrategy for SayStrategy {
    fn name(&self) -> &'static str {
        "say"
    }

    async fn render(&self, text: &str, target: &Path) -> VoiceResult<()> {
        // Intermediate file is removed when this guard drops, on every path.
        let aiff = AudioArtifact::adopt(target.with_extension("aiff"));

        BoundedCommand::new(&self.say_bin, self.say_limit)
            .arg("-o")
            .arg(aiff.path())
            .arg("-f")
            .arg("-")
            .stdin_text(text)
            .run()
            .await?;

        if !aiff.exists() {
            return Err(VoiceError::Synthesis(format!(
                "{} produced no AIFF output",
                self.say_bin
            )));
        }

        BoundedCommand::new(&self.afconvert_bin, self.convert_limit)
            .arg("-f")
            .arg("WAVE")
            .arg("-d")
            .arg("LEI16@22050")
            .arg(aiff.path())
            .arg(target)
            .run()
            .await
    }
}

/// Ordered fallback over synthesis strategies.
pub struct SynthesisChain {
    artifact_dir: PathBuf,
    strategies: Vec<Box<dyn SynthesisStrategy>>,
}

impl SynthesisChain {
    pub fn new(artifact_dir: impl Into<PathBuf>, strategies: Vec<Box<dyn SynthesisStrategy>>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            strategies,
        }
    }

    /// Piper first, then say + afconvert, with binaries and bounds from config.
    pub fn from_config(config: &SynthesisConfig) -> Self {
        let secs = Duration::from_secs;
        Self::new(
            config.artifact_dir.clone(),
            vec![
                Box::new(PiperStrategy::new(
                    config.piper_bin.clone(),
                    config.piper_voice.clone(),
                    secs(config.primary_timeout_secs),
                )),
                Box::new(SayStrategy::new(
                    config.say_bin.clone(),
                    config.afconvert_bin.clone(),
                    secs(config.fallback_timeout_secs),
                    secs(config.convert_timeout_secs),
                )),
            ],
        )
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Render `text` to a fresh WAV. The artifact is owned by the caller from here on.
    pub async fn synthesize(&self, text: &str) -> VoiceResult<AudioArtifact> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::Synthesis("nothing to speak".to_string()));
        }

        let target = AudioArtifact::adopt(
            self.artifact_dir
                .join(format!("pangool-{}.wav", Uuid::new_v4())),
        );
        info!(
            target: "pangool::tts",
            chars = text.chars().count(),
            path = %target.path().display(),
            "Synthesizing speech"
        );

        for strategy in &self.strategies {
            if !strategy.is_available() {
                debug!(target: "pangool::tts", strategy = strategy.name(), "Skipped (unavailable)");
                continue;
            }
            match strategy.render(text, target.path()).await {
                Ok(()) if target.exists() => {
                    info!(
                        target: "pangool::tts",
                        strategy = strategy.name(),
                        bytes = target.size_bytes(),
                        "Speech synthesized"
                    );
                    return Ok(target);
                }
                Ok(()) => warn!(
                    target: "pangool::tts",
                    strategy = strategy.name(),
                    "Reported success but wrote no audio"
                ),
                Err(e) => warn!(target: "pangool::tts", strategy = strategy.name(), "Failed: {}", e),
            }
            target.clear();
        }

        error!(target: "pangool::tts", "All synthesis strategies failed");
        Err(VoiceError::Synthesis("all synthesis strategies failed".to_string()))
    }
}
