//! # Normalize
//!
//! Text normalization for the docmatch embedding core.
//!
//! Raw document text is cleaned (control characters, redundant whitespace,
//! page furniture) and segmented into sentence units. The output is
//! referentially transparent: the same input and configuration always yield
//! the same normalized text, which is what makes it usable as a cache key.
//!
//! ```text
//! raw text ──► clean lines ──► sentence units ──► normalized text
//!                                    │
//!                                    ▼
//!                        key terms, dated periods
//! ```

pub mod config;
pub mod error;
pub mod normalizer;
pub mod periods;
pub mod stopwords;

pub use config::{CasePolicy, NormalizerConfig};
pub use error::{NormalizationError, Result};
pub use normalizer::{NormalizedText, TextNormalizer};
pub use periods::{Gap, Period, Timeline};
pub use stopwords::is_stopword;
