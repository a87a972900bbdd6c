//! # Document Pipeline
//!
//! Turns raw documents into vectors and answers "which documents are most
//! like this text?" over them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Document Pipeline                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Admission ──► TextNormalizer ──► EmbeddingCache ──► VectorIndex│
//! │                      │                  │                │      │
//! │                      ▼                  ▼                ▼      │
//! │               NormalizedText    EmbeddingProvider   Results     │
//! │                                                                 │
//! │  UploadScanner ──► ingest_batch          compare ──► MatchReport│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use docmatch_pipeline::{DocumentPipeline, EmbeddingConfig, PipelineConfig};
//!
//! # async fn example() -> docmatch_pipeline::Result<()> {
//! let config = PipelineConfig::default().with_embedding(EmbeddingConfig::hashing(384));
//! let pipeline = DocumentPipeline::from_config(config).await?;
//!
//! pipeline.ingest(Some("d1".to_string()), "The cat sat on the mat.").await?;
//! let results = pipeline.query("cat on mat", 5).await?;
//! assert_eq!(results[0].id, "d1");
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod matching;

pub use config::{AdmissionConfig, CacheConfig, EmbeddingConfig, PipelineConfig, ProviderKind};
pub use document::{Document, DocumentRecord, IngestOutcome, IngestReceipt};
pub use engine::{DocumentPipeline, PipelineStats, UploadsReport};
pub use error::{ErrorKind, PipelineError, Result, Subject};
pub use docmatch_normalize::{Gap, Period, Timeline};
pub use matching::{MatchOptions, MatchReport, SortBy};
