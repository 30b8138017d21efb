//! Error types for the Pangool core

use thiserror::Error;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while configuring the oracle or talking to the inference backend
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inference backend unreachable: {0}")]
    Connection(String),

    #[error("Inference backend returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed inference payload: {0}")]
    Malformed(String),

    #[error("Inference backend reported: {0}")]
    Backend(String),

    #[error("Inference backend silent for {0}s")]
    IdleTimeout(u64),
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::Connection(err.to_string())
    }
}
