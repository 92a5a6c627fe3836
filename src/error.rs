//! Error types for the TelOS core

use std::io;
use thiserror::Error;

/// Result type alias for TelOS operations
pub type Result<T> = std::result::Result<T, TelosError>;

/// Main error type for TelOS operations
#[derive(Error, Debug)]
pub enum TelosError {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Morph lookup failure
    #[error("Morph not found: {0}")]
    MorphNotFound(String),

    /// Unknown morph kind with no registered template
    #[error("Unknown morph kind: {0}")]
    UnknownKind(String),

    /// Malformed WAL line
    #[error("Malformed WAL line: {0}")]
    MalformedLine(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<TelosError>,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl TelosError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        TelosError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        TelosError::Config(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        TelosError::Other(msg.into())
    }
}
