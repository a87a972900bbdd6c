//! Error types for text normalization.

use thiserror::Error;

/// Result type alias for normalization operations.
pub type Result<T> = std::result::Result<T, NormalizationError>;

/// Errors raised while normalizing input text.
///
/// None of these are retryable as-is: the caller has to truncate or reject
/// the input before trying again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// Input bytes are not valid UTF-8.
    #[error("input is not valid UTF-8 (first invalid byte at offset {valid_up_to})")]
    NotUtf8 { valid_up_to: usize },

    /// Input is longer than the configured maximum.
    #[error("input too long: {length} characters, max {max_length}")]
    TooLong { length: usize, max_length: usize },

    /// Nothing analyzable is left once the text is cleaned.
    #[error("input contains no analyzable text")]
    Empty,
}
