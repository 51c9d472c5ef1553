//! Error types for the backup-sync library.

use thiserror::Error;

/// Errors that can occur while synchronizing backups.
#[derive(Error, Debug)]
pub enum Error {
    /// A required environment variable is absent or empty.
    #[error("{0} environment variable is not defined")]
    MissingEnv(&'static str),

    /// A configuration value could not be used.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The panel answered with a non-success status.
    #[error("Panel API error ({status}): {message}")]
    Panel {
        /// HTTP status code returned by the panel.
        status: u16,
        /// Error detail reported by the panel, or the raw body.
        message: String,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for backup-sync operations.
pub type Result<T> = std::result::Result<T, Error>;
