//! Error types for the document pipeline.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use docmatch_embeddings::{EmbeddingError, IndexError};
use docmatch_normalize::NormalizationError;
use docmatch_uploads::UploadsError;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// What a failed operation was working on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// A document, by id.
    Document(String),
    /// A query, by its text.
    Query(String),
    /// A pair of documents.
    Pair(String, String),
}

impl Subject {
    /// The document id, if the subject is a single document.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Document(id) => Some(id),
            Self::Query(_) | Self::Pair(..) => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(id) => write!(f, "document {id}"),
            Self::Query(text) => write!(f, "query {text:?}"),
            Self::Pair(a, b) => write!(f, "documents {a} and {b}"),
        }
    }
}

/// Errors that can occur in the document pipeline.
///
/// Component errors are carried unchanged as the `source`, annotated with
/// the document or query they happened on.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input text was rejected by the normalizer.
    #[error("{subject}: normalization failed: {source}")]
    Normalization {
        subject: Subject,
        source: NormalizationError,
    },

    /// The embedding provider failed.
    #[error("{subject}: embedding failed: {source}")]
    Embedding {
        subject: Subject,
        source: EmbeddingError,
    },

    /// The similarity index rejected an operation.
    #[error("{subject}: index error: {source}")]
    Index { subject: Subject, source: IndexError },

    /// The provider could not be loaded at start-up.
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[source] EmbeddingError),

    /// The admission queue is full.
    #[error("pipeline overloaded: {capacity} requests already admitted")]
    Overloaded { capacity: usize },

    /// The pipeline is not running.
    #[error("pipeline not ready")]
    NotReady,

    /// No document with this id is indexed.
    #[error("unknown document: {0}")]
    UnknownDocument(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Uploads scan error.
    #[error("uploads error: {0}")]
    Uploads(#[from] UploadsError),
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input text. Not retried.
    Normalization,
    /// The model cannot be used at all.
    ModelUnavailable,
    /// A single inference failed. The item can be skipped.
    Inference,
    /// The index or registry refused the operation.
    IndexState,
    /// Refused by admission control. Retry later.
    Rejected,
    /// The pipeline is not serving requests.
    Unavailable,
}

impl PipelineError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Normalization { .. } => ErrorKind::Normalization,
            Self::Embedding { source, .. } if source.is_fatal() => ErrorKind::ModelUnavailable,
            Self::Embedding { .. } => ErrorKind::Inference,
            Self::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            Self::Index { .. } | Self::UnknownDocument(_) => ErrorKind::IndexState,
            Self::Overloaded { .. } | Self::Uploads(_) => ErrorKind::Rejected,
            Self::NotReady | Self::Config(_) => ErrorKind::Unavailable,
        }
    }

    /// What the error happened on, if it is tied to a document or query.
    pub fn subject(&self) -> Option<&Subject> {
        match self {
            Self::Normalization { subject, .. }
            | Self::Embedding { subject, .. }
            | Self::Index { subject, .. } => Some(subject),
            _ => None,
        }
    }

    pub(crate) fn normalization(subject: &Subject) -> impl FnOnce(NormalizationError) -> Self {
        let subject = subject.clone();
        move |source| Self::Normalization { subject, source }
    }

    pub(crate) fn embedding(subject: &Subject) -> impl FnOnce(EmbeddingError) -> Self {
        let subject = subject.clone();
        move |source| Self::Embedding { subject, source }
    }

    pub(crate) fn index(subject: &Subject) -> impl FnOnce(IndexError) -> Self {
        let subject = subject.clone();
        move |source| Self::Index { subject, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_annotates_subject() {
        let err = PipelineError::normalization(&Subject::Document("d1".to_string()))(
            NormalizationError::Empty,
        );
        assert!(err.to_string().starts_with("document d1: normalization failed"));
        assert_eq!(err.subject().and_then(Subject::document_id), Some("d1"));

        let err = PipelineError::index(&Subject::Query("cat".to_string()))(IndexError::InvalidK);
        assert_eq!(err.to_string(), "query \"cat\": index error: k must be positive");
        assert_eq!(err.subject().and_then(Subject::document_id), None);
    }

    #[test]
    fn test_kind() {
        let subject = Subject::Document("d1".to_string());
        assert_eq!(
            PipelineError::embedding(&subject)(EmbeddingError::Inference("bad".to_string())).kind(),
            ErrorKind::Inference
        );
        assert_eq!(
            PipelineError::embedding(&subject)(EmbeddingError::ModelUnavailable(
                "gone".to_string()
            ))
            .kind(),
            ErrorKind::ModelUnavailable
        );
        assert_eq!(
            PipelineError::Overloaded { capacity: 1 }.kind(),
            ErrorKind::Rejected
        );
        assert_eq!(
            PipelineError::UnknownDocument("x".to_string()).kind(),
            ErrorKind::IndexState
        );
        assert_eq!(PipelineError::NotReady.kind(), ErrorKind::Unavailable);
    }
}
