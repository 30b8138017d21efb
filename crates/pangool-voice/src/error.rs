//! Error types for the Pangool voice pipeline

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while synthesizing, playing or transcribing audio
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("External process error: {0}")]
    Process(String),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("VAD initialization failed: {0}")]
    VadInit(String),

    #[error("VAD processing error: {0}")]
    VadProcessing(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => VoiceError::Io(io),
            other => VoiceError::Decode(other.to_string()),
        }
    }
}
