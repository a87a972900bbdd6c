//! Random-hyperplane locality sensitive hashing.
//!
//! Each table hashes a vector to a `bits`-wide signature, one bit per
//! hyperplane (`dot >= 0`). A search gathers every entry that shares a
//! bucket with the query in any table, plus the buckets one bit away, and
//! re-ranks those candidates with exact cosine. When the probes turn up
//! fewer than `k` candidates the search falls back to a full scan, so the
//! result size always matches the exact index.

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{IndexError, IndexResult};
use crate::index::{ExactIndex, IndexKind, VectorIndex};
use crate::similarity::{SimilarityResult, dot_product};

/// LSH parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LshConfig {
    /// Number of independent hash tables.
    pub tables: usize,

    /// Hyperplanes per table (signature width, at most 64).
    pub bits: usize,

    /// Seed for hyperplane generation. Same seed, same buckets.
    pub seed: u64,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            tables: 8,
            bits: 12,
            seed: 42,
        }
    }
}

impl LshConfig {
    /// Check the parameters are usable.
    pub fn validate(&self) -> IndexResult<()> {
        if self.tables == 0 {
            return Err(IndexError::InvalidConfig(
                "lsh.tables must be positive".to_string(),
            ));
        }
        if self.bits == 0 || self.bits > 64 {
            return Err(IndexError::InvalidConfig(format!(
                "lsh.bits must be between 1 and 64, got {}",
                self.bits
            )));
        }
        Ok(())
    }
}

/// Approximate index: LSH candidate generation over an [`ExactIndex`].
pub struct LshIndex {
    /// Vector storage and exact scoring.
    inner: ExactIndex,

    /// `hyperplanes[table][bit]`.
    hyperplanes: Vec<Vec<Embedding>>,

    /// Per table, signature to ids.
    buckets: Vec<HashMap<u64, Vec<String>>>,

    /// Signatures of each indexed id, one per table.
    signatures: HashMap<String, Vec<u64>>,
}

impl LshIndex {
    /// Create an empty LSH index.
    pub fn new(dimension: usize, config: LshConfig) -> IndexResult<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let hyperplanes = (0..config.tables)
            .map(|_| {
                (0..config.bits)
                    .map(|_| {
                        (0..dimension)
                            .map(|_| rng.random_range(-1.0f32..1.0))
                            .collect()
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            inner: ExactIndex::new(dimension),
            hyperplanes,
            buckets: vec![HashMap::new(); config.tables],
            signatures: HashMap::new(),
        })
    }

    fn signature(planes: &[Embedding], vector: &[f32]) -> IndexResult<u64> {
        let mut signature = 0u64;
        for (bit, plane) in planes.iter().enumerate() {
            if dot_product(plane, vector)? >= 0.0 {
                signature |= 1 << bit;
            }
        }
        Ok(signature)
    }

    fn signatures_for(&self, vector: &[f32]) -> IndexResult<Vec<u64>> {
        self.hyperplanes
            .iter()
            .map(|planes| Self::signature(planes, vector))
            .collect()
    }

    fn unbucket(&mut self, id: &str) {
        let Some(signatures) = self.signatures.remove(id) else {
            return;
        };
        for (table, signature) in self.buckets.iter_mut().zip(signatures) {
            if let Some(ids) = table.get_mut(&signature) {
                ids.retain(|existing| existing != id);
                if ids.is_empty() {
                    table.remove(&signature);
                }
            }
        }
    }

    /// Insertion positions of entries in the query's buckets and their
    /// one-bit neighbours.
    fn candidates(&self, signatures: &[u64]) -> BTreeSet<usize> {
        let bits = self.hyperplanes.first().map_or(0, Vec::len);
        let mut positions = BTreeSet::new();

        for (table, &signature) in self.buckets.iter().zip(signatures) {
            let probes = std::iter::once(signature).chain((0..bits).map(|b| signature ^ (1 << b)));
            for probe in probes {
                let Some(ids) = table.get(&probe) else {
                    continue;
                };
                positions.extend(ids.iter().filter_map(|id| self.inner.position_of(id)));
            }
        }
        positions
    }
}

impl VectorIndex for LshIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Lsh
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn insert(&mut self, id: String, vector: Embedding) -> IndexResult<()> {
        self.inner.check_dimension(&vector)?;
        let signatures = self.signatures_for(&vector)?;

        self.unbucket(&id);
        for (table, &signature) in self.buckets.iter_mut().zip(&signatures) {
            table.entry(signature).or_default().push(id.clone());
        }
        self.signatures.insert(id.clone(), signatures);
        self.inner.insert(id, vector)
    }

    fn remove(&mut self, id: &str) -> bool {
        self.unbucket(id);
        self.inner.remove(id)
    }

    fn get(&self, id: &str) -> Option<&Embedding> {
        self.inner.get(id)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn ids(&self) -> Vec<&str> {
        self.inner.ids()
    }

    fn search(&self, query: &[f32], k: usize) -> IndexResult<Vec<SimilarityResult>> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        self.inner.check_dimension(query)?;

        let signatures = self.signatures_for(query)?;
        let positions: Vec<usize> = self.candidates(&signatures).into_iter().collect();

        if positions.len() < k.min(self.len()) {
            debug!(
                "LSH probe found {} candidates for k={k}, scanning all {} entries",
                positions.len(),
                self.len()
            );
            return self.inner.search(query, k);
        }
        self.inner.rank_positions(query, &positions, k)
    }
}
