//! Error types for the Yoko core (message log, configuration, AI reply generation)

use thiserror::Error;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the message log and configuration layer
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Corrupt log key: expected 8 bytes, got {0}")]
    CorruptKey(usize),
}

/// Errors raised by an AI reply generator. Any of these abandons the current turn.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Generator API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed generator response: {0}")]
    Malformed(String),

    #[error("Generator returned an empty reply")]
    EmptyReply,

    #[error("Generator configuration error: {0}")]
    Config(String),
}
