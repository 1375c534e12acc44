//! Error types for the voice shell

use thiserror::Error;

/// Result type alias for voice shell operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice shell
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend answered with a non-success status
    #[error("backend error: {status} - {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Wake word channel error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Speech capture engine error
    #[error("speech error: {0}")]
    Speech(String),

    /// Streaming transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing error
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}
