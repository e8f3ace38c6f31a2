//! Error types for scribed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScribedError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Queue errors
    #[error("Queue receive failed: {message}")]
    QueueReceive { message: String },

    #[error("Queue acknowledge failed for receipt {receipt}: {message}")]
    QueueAcknowledge { receipt: String, message: String },

    // Object storage errors
    #[error("Object fetch failed for {bucket}/{key}: {message}")]
    ObjectFetch {
        bucket: String,
        key: String,
        message: String,
    },

    // Audio errors
    #[error("Audio decode failed: {message}")]
    AudioDecode { message: String },

    // Persistence errors
    #[error("Store operation failed: {message}")]
    Store { message: String },

    #[error("Batch {batch_id} not found")]
    BatchNotFound { batch_id: String },

    #[error("Invalid batch transition {from:?} -> {to:?} for {batch_id}")]
    InvalidTransition {
        batch_id: String,
        from: crate::model::BatchStatus,
        to: crate::model::BatchStatus,
    },

    // Transcription provider errors
    #[error("Transcription provider error: {message}")]
    Provider { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ScribedError>;
