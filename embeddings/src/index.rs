//! Similarity indices over document vectors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{IndexError, IndexResult};
use crate::lsh::{LshConfig, LshIndex};
use crate::similarity::{SimilarityResult, cosine_similarity, rank};

/// Which index implementation to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Brute-force cosine over every entry.
    #[default]
    Exact,
    /// Random-hyperplane LSH candidates, re-ranked exactly.
    Lsh,
}

/// Index configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index implementation.
    pub kind: IndexKind,

    /// LSH parameters. Ignored for the exact index.
    pub lsh: LshConfig,
}

/// A mutable set of `(document id, vector)` entries supporting top-k search.
///
/// Ids are unique; inserting an existing id replaces its vector. Results of
/// [`VectorIndex::search`] are ordered by descending cosine similarity, ties
/// broken by insertion order.
pub trait VectorIndex: Send + Sync {
    /// Implementation in use.
    fn kind(&self) -> IndexKind;

    /// Vector length accepted by this index.
    fn dimension(&self) -> usize;

    /// Insert or replace the vector for `id`.
    fn insert(&mut self, id: String, vector: Embedding) -> IndexResult<()>;

    /// Remove `id`. Returns whether it was present.
    fn remove(&mut self, id: &str) -> bool;

    /// Vector stored for `id`.
    fn get(&self, id: &str) -> Option<&Embedding>;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Ids in insertion order.
    fn ids(&self) -> Vec<&str>;

    /// Top `k` entries by similarity to `query`.
    ///
    /// Returns fewer than `k` results when the index holds fewer entries,
    /// and an empty list for an empty index.
    fn search(&self, query: &[f32], k: usize) -> IndexResult<Vec<SimilarityResult>>;

    /// Check if `id` is indexed.
    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Check if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cosine similarity between two indexed documents.
    fn pairwise(&self, a: &str, b: &str) -> IndexResult<f32> {
        let left = self
            .get(a)
            .ok_or_else(|| IndexError::NotFound(a.to_string()))?;
        let right = self
            .get(b)
            .ok_or_else(|| IndexError::NotFound(b.to_string()))?;
        cosine_similarity(left, right)
    }
}

/// Build the index selected by `config`.
pub fn build_index(config: &IndexConfig, dimension: usize) -> IndexResult<Box<dyn VectorIndex>> {
    if dimension == 0 {
        return Err(IndexError::InvalidConfig(
            "dimension must be positive".to_string(),
        ));
    }

    let index: Box<dyn VectorIndex> = match config.kind {
        IndexKind::Exact => Box::new(ExactIndex::new(dimension)),
        IndexKind::Lsh => Box::new(LshIndex::new(dimension, config.lsh.clone())?),
    };
    info!("Built {:?} index with dimension {dimension}", config.kind);
    Ok(index)
}

/// Brute-force index. Every search scores every entry.
#[derive(Debug, Clone)]
pub struct ExactIndex {
    /// Entries in insertion order.
    entries: IndexMap<String, Embedding>,

    /// Expected dimension of vectors.
    dimension: usize,
}

impl ExactIndex {
    /// Create an empty index for vectors of length `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            dimension,
        }
    }

    pub(crate) fn check_dimension(&self, vector: &[f32]) -> IndexResult<()> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insertion position of `id`.
    pub(crate) fn position_of(&self, id: &str) -> Option<usize> {
        self.entries.get_index_of(id)
    }

    /// Rank a subset of entries, given by insertion position.
    pub(crate) fn rank_positions(
        &self,
        query: &[f32],
        positions: &[usize],
        k: usize,
    ) -> IndexResult<Vec<SimilarityResult>> {
        let candidates = positions
            .iter()
            .filter_map(|&pos| self.entries.get_index(pos))
            .map(|(id, vector)| (id.as_str(), vector.as_slice()));
        rank(query, candidates, k)
    }
}

impl VectorIndex for ExactIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Exact
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn insert(&mut self, id: String, vector: Embedding) -> IndexResult<()> {
        self.check_dimension(&vector)?;
        debug!("Indexed vector for {id}");
        // Replacing keeps the original insertion slot.
        self.entries.insert(id, vector);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        self.entries.shift_remove(id).is_some()
    }

    fn get(&self, id: &str) -> Option<&Embedding> {
        self.entries.get(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    fn search(&self, query: &[f32], k: usize) -> IndexResult<Vec<SimilarityResult>> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        self.check_dimension(query)?;

        let candidates = self
            .entries
            .iter()
            .map(|(id, vector)| (id.as_str(), vector.as_slice()));
        rank(query, candidates, k)
    }
}
