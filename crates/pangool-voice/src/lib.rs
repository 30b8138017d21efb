//! # Pangool Voice
//!
//! The spoken half of the oracle: text becomes a WAV through a fallback chain of
//! synthesizers, the WAV is played in the background and deleted afterwards, and visitor
//! recordings are transcribed by a lazily loaded local Whisper model.
//!
//! ```text
//! text ─▶ SynthesisChain (piper ▸ say+afconvert) ─▶ AudioArtifact ─▶ PlaybackManager (afplay)
//!                                                                          │ drop = unlink
//! upload ─▶ TranscriptionGateway ─▶ (ffmpeg if not WAV) ─▶ decode ─▶ VAD ─▶ SpeechEngine ─▶ Option<String>
//! ```

pub mod artifact;
pub mod audio;
pub mod error;
pub mod playback;
pub mod process;
pub mod synthesis;
pub mod transcription;
pub mod vad;

pub use artifact::AudioArtifact;
pub use audio::{decode_wav, decode_wav_file, is_wav, ENGINE_SAMPLE_RATE};
pub use error::{VoiceError, VoiceResult};
pub use playback::{PlaybackHandle, PlaybackManager, PlaybackOutcome};
pub use process::BoundedCommand;
pub use synthesis::{PiperStrategy, SayStrategy, SynthesisChain, SynthesisStrategy};
pub use transcription::{join_segments, SpeechEngine, TranscriptionGateway};
#[cfg(feature = "whisper")]
pub use transcription::WhisperEngine;
pub use vad::{VadConfig, VadDetector};
