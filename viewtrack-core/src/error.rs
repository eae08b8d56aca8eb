//! Error types for viewtrack-core

use thiserror::Error;

/// Main error type for the viewtrack-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Delivery error (never surfaced past the transport)
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for viewtrack-core
pub type Result<T> = std::result::Result<T, Error>;
