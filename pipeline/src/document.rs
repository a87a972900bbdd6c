//! Documents and ingestion outcomes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use docmatch_embeddings::{Embedding, Fingerprint, VectorSource};
use docmatch_normalize::Timeline;

use crate::error::PipelineError;

/// A fully processed document, ready to be committed to the index.
#[derive(Debug, Clone)]
pub struct Document {
    /// Document id.
    pub id: String,

    /// Text as received.
    pub raw_text: String,

    /// Sentence units joined with `\n`.
    pub normalized_text: String,

    /// Content address of `normalized_text`.
    pub fingerprint: Fingerprint,

    /// Unit-length document vector.
    pub vector: Arc<Embedding>,

    /// When the document was ingested.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Split into the registry record and the vector owned by the index.
    pub(crate) fn into_parts(self) -> (DocumentRecord, Embedding) {
        let record = DocumentRecord {
            id: self.id,
            fingerprint: self.fingerprint,
            normalized_text: self.normalized_text,
            raw_len: self.raw_text.len(),
            timeline: Timeline::from_text(&self.raw_text),
            created_at: self.created_at,
        };
        (record, self.vector.as_ref().clone())
    }
}

/// What the pipeline keeps about an indexed document besides its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    /// Document id.
    pub id: String,

    /// Content address of the normalized text.
    pub fingerprint: Fingerprint,

    /// Normalized text.
    pub normalized_text: String,

    /// Size of the raw text in bytes.
    pub raw_len: usize,

    /// Dated education and experience periods found in the raw text.
    pub timeline: Timeline,

    /// When the document was ingested.
    pub created_at: DateTime<Utc>,
}

/// A successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    /// Assigned or confirmed document id.
    pub id: String,

    /// Content address of the normalized text.
    pub fingerprint: Fingerprint,

    /// Whether the vector came from the cache or fresh inference.
    pub source: VectorSource,

    /// Whether an existing document with this id was replaced.
    pub replaced: bool,
}

/// Per-document result of a batch ingestion.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The document is indexed.
    Ingested(IngestReceipt),

    /// The document was not indexed.
    Failed {
        /// Id the document was submitted under.
        id: String,
        /// Why it failed.
        error: PipelineError,
    },
}

impl IngestOutcome {
    /// Document id, whether ingestion succeeded or not.
    pub fn id(&self) -> &str {
        match self {
            Self::Ingested(receipt) => &receipt.id,
            Self::Failed { id, .. } => id,
        }
    }

    /// Check if the document was indexed.
    pub fn is_ingested(&self) -> bool {
        matches!(self, Self::Ingested(_))
    }
}
