//! Error types for the uploads scanner.

use thiserror::Error;

/// Result type alias for uploads operations.
pub type Result<T> = std::result::Result<T, UploadsError>;

/// Errors that abort a scan. Problems with individual files are reported
/// as skipped entries instead.
#[derive(Error, Debug)]
pub enum UploadsError {
    /// Uploads directory not found.
    #[error("uploads directory not found: {0}")]
    DirectoryNotFound(String),

    /// Invalid exclude pattern.
    #[error("invalid exclude pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
