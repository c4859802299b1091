//! Error types for Apiscribe

use std::io;
use thiserror::Error;

/// Result type for Apiscribe operations
pub type Result<T> = std::result::Result<T, ApiscribeError>;

/// Errors that can occur in Apiscribe
#[derive(Debug, Error)]
pub enum ApiscribeError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A required capture setting was not supplied
    #[error("No {0} provided. Aborting API capture.")]
    MissingConfig(&'static str),

    /// A capture session is already running
    #[error("A capture session is already active")]
    SessionActive,

    /// Browser capability failure (launch, page, navigation)
    #[error("Browser error: {0}")]
    Browser(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl ApiscribeError {
    /// Wrap a browser capability failure
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser(message.into())
    }
}
