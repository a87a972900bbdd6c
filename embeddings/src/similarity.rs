//! Similarity computation for embeddings.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::Embedding;
use crate::error::{IndexError, IndexResult};

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
///
/// Zero vectors score 0.0 against everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> IndexResult<f32> {
    let dot = dot_product(a, b)?;
    let magnitude_a = magnitude(a);
    let magnitude_b = magnitude(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0))
}

/// Compute the dot product between two embeddings.
pub fn dot_product(a: &[f32], b: &[f32]) -> IndexResult<f32> {
    if a.len() != b.len() {
        return Err(IndexError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Euclidean length of a vector.
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// A similarity search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// ID of the matched document.
    pub id: String,

    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

impl SimilarityResult {
    /// Create a new similarity result.
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Score `candidates` against `query` and keep the best `k`.
///
/// Candidates are expected in insertion order; the sort is stable, so equal
/// scores keep that order.
pub fn rank<'a, I>(query: &[f32], candidates: I, k: usize) -> IndexResult<Vec<SimilarityResult>>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut scores: Vec<(OrderedFloat<f32>, &str)> = Vec::new();
    for (id, embedding) in candidates {
        scores.push((OrderedFloat(cosine_similarity(query, embedding)?), id));
    }

    // Sort by score descending
    scores.sort_by(|a, b| b.0.cmp(&a.0));

    Ok(scores
        .into_iter()
        .take(k)
        .map(|(score, id)| SimilarityResult::new(id, score.0))
        .collect())
}

/// Normalize an embedding to unit length. Zero vectors are left untouched.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude = magnitude(embedding);
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// Compute the average of multiple embeddings.
pub fn average(embeddings: &[Embedding]) -> IndexResult<Embedding> {
    let Some(first) = embeddings.first() else {
        return Ok(Vec::new());
    };

    let dim = first.len();
    for e in embeddings {
        if e.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                actual: e.len(),
            });
        }
    }

    let n = embeddings.len() as f32;
    let mut result = vec![0.0f32; dim];

    for embedding in embeddings {
        for (acc, val) in result.iter_mut().zip(embedding.iter()) {
            *acc += val / n;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let sim = cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap();
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &b).is_err());
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_average() {
        let avg = average(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(avg, vec![0.5, 0.5]);
        assert!(average(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_rank_keeps_insertion_order_on_ties() {
        let query = vec![1.0, 0.0, 0.0];
        let candidates = [
            ("b", vec![0.0, 1.0, 0.0]),
            ("tie-first", vec![0.7, 0.7, 0.0]),
            ("a", vec![1.0, 0.0, 0.0]),
            ("tie-second", vec![0.7, 0.7, 0.0]),
        ];

        let results = rank(
            &query,
            candidates.iter().map(|(id, v)| (*id, v.as_slice())),
            3,
        )
        .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "tie-first", "tie-second"]);
    }
}
