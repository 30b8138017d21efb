//! # Pangool Core
//!
//! Shared configuration and the generation half of the oracle: theme prompts, the
//! inference backend client, and the divination stream that feeds the tablet.
//!
//! ```text
//! DivinationRequest ─▶ Theme::resolve ─▶ ChatRequest ─▶ InferenceBackend (NDJSON)
//!                                                          │
//!             DivinationStream ◀── Token… Done|Error ◀── MarkerFilter
//! ```

pub mod config;
pub mod divination;
pub mod error;
pub mod markers;
pub mod oracle;
pub mod themes;

pub use config::{
    InferenceConfig, LoggingConfig, PangoolConfig, PlaybackConfig, ServerConfig, SynthesisConfig,
    TokenMode, TranscriptionConfig,
};
pub use divination::{
    ConsumerProbe, DivinationEvent, DivinationRequest, DivinationService, DivinationStream,
};
pub use error::{CoreError, CoreResult};
pub use markers::{MarkerFilter, DEFAULT_MARKERS};
pub use oracle::{
    parse_chunk_line, ChatChunk, ChatMessage, ChatRequest, ChunkStream, DecodingOptions,
    InferenceBackend, OllamaBackend,
};
pub use themes::{compose_user_message, Theme, ORACLE_SYSTEM_PROMPT};
