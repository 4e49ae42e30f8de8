//! Error types for the application

use thiserror::Error;

use super::types::Instrument;

/// Result type alias using our PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A single data provider failed or returned unusable data
    #[error("Provider error: {0}")]
    Provider(String),

    /// Every configured provider failed for one fetch
    #[error("All providers failed for instrument: {instrument}")]
    AllProvidersFailed { instrument: Instrument },

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Event store errors; the store is the sole source of truth for
    /// learning, so callers must not swallow these on append
    #[error("Event store error: {0}")]
    Store(String),

    /// Database backend errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors from the JSONL store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}
