//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Result type alias for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Errors raised by embedding providers.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The model could not be loaded. Fatal: the pipeline cannot proceed.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// A batch could not be embedded. Recoverable per item.
    #[error("inference failure: {0}")]
    Inference(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Whether the error means the model itself is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_))
    }
}

/// Invariant violations in a similarity index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Vector length differs from the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// No entry for the given document id.
    #[error("document not indexed: {0}")]
    NotFound(String),

    /// `k` must be a positive integer.
    #[error("k must be positive")]
    InvalidK,

    /// Index parameters are unusable.
    #[error("invalid index config: {0}")]
    InvalidConfig(String),
}
