//! # Embeddings
//!
//! Dense vector embeddings and similarity search for docmatch.
//!
//! ## Features
//!
//! - **Providers**: HTTP (OpenAI-compatible) and offline feature hashing
//! - **Fingerprints**: content addresses namespaced by normalizer and model
//! - **Caching**: bounded LRU with single-flight computation per fingerprint
//! - **Similarity Search**: exact brute force, or LSH with exact re-ranking
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Fingerprint ──► EmbeddingCache ──miss──► EmbeddingProvider     │
//! │                        │                        │               │
//! │                        ▼                        ▼               │
//! │                  VectorIndex (ExactIndex | LshIndex)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod lsh;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, CachedVector, EmbeddingCache, VectorSource};
pub use error::{EmbeddingError, IndexError, IndexResult, Result};
pub use fingerprint::{Fingerprint, FingerprintNamespace};
pub use index::{ExactIndex, IndexConfig, IndexKind, VectorIndex, build_index};
pub use lsh::{LshConfig, LshIndex};
pub use provider::{EmbeddingProvider, HashingProvider, HttpProvider};
pub use similarity::{SimilarityResult, cosine_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Output dimension of all-MiniLM-L6-v2.
pub const DEFAULT_DIMENSION: usize = 384;
