//! Content addresses for normalized text.

use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// SHA-256 of normalized text within a [`FingerprintNamespace`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Everything besides the text that decides what vector a text maps to.
///
/// Switching the normalizer or the model changes every fingerprint, so
/// stale cache entries are never mixed with vectors from another model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintNamespace {
    /// Normalizer model and version.
    pub normalizer: String,

    /// Embedding model identity.
    pub model: String,

    /// Embedding dimension.
    pub dimension: usize,
}

impl FingerprintNamespace {
    /// Create a namespace.
    pub fn new(normalizer: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            normalizer: normalizer.into(),
            model: model.into(),
            dimension,
        }
    }

    /// Fingerprint `normalized_text` within this namespace.
    pub fn fingerprint(&self, normalized_text: &str) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.normalizer.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        hasher.update((self.dimension as u64).to_le_bytes());
        hasher.update(normalized_text.as_bytes());
        Fingerprint(hasher.finalize().into())
    }
}
