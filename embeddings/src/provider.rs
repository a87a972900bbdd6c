//! Embedding providers.
//!
//! A provider is constructed once, loaded once at start-up with
//! [`EmbeddingProvider::load`], and then shared by reference for the life of
//! the process. Every vector a provider hands out through
//! [`EmbeddingProvider::embed`] is L2-normalized, so dot product and cosine
//! similarity agree downstream.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{EmbeddingError, Result};
use crate::similarity::{magnitude, normalize};
use crate::{DEFAULT_DIMENSION, Embedding};

/// Default number of texts per inference call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Upper bound on texts per inference call.
pub const MAX_BATCH_SIZE: usize = 256;

/// Default model served behind the HTTP endpoint.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Environment variable holding the HTTP provider's API key.
pub const API_KEY_ENV: &str = "DOCMATCH_EMBEDDING_API_KEY";

const WARMUP_TEXT: &str = "docmatch warm-up probe";

/// Clamp a requested batch size into `[1, MAX_BATCH_SIZE]`.
pub fn clamp_batch_size(requested: usize) -> usize {
    if requested > MAX_BATCH_SIZE {
        warn!("batch size {requested} exceeds max {MAX_BATCH_SIZE}; clamping");
    }
    requested.clamp(1, MAX_BATCH_SIZE)
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Model identity. Part of the cache-key namespace.
    fn model_id(&self) -> &str;

    /// Fixed output dimension.
    fn dimension(&self) -> usize;

    /// Maximum texts per inference call.
    fn batch_size(&self) -> usize;

    /// Load the model. Fails with [`EmbeddingError::ModelUnavailable`].
    async fn load(&self) -> Result<()>;

    /// Whether [`EmbeddingProvider::load`] has succeeded.
    fn is_loaded(&self) -> bool;

    /// Release the model. Further calls fail until loaded again.
    fn unload(&self);

    /// Run inference on a single batch of at most `batch_size` texts.
    ///
    /// Implementations return raw vectors; [`EmbeddingProvider::embed`]
    /// validates and normalizes them.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed any number of texts, split into batches.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if !self.is_loaded() {
            return Err(EmbeddingError::ModelUnavailable(format!(
                "{} is not loaded",
                self.model_id()
            )));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size().max(1)) {
            let raw = self.embed_batch(batch).await?;
            vectors.extend(finish_batch(batch.len(), self.dimension(), raw)?);
        }

        debug!("Embedded {} texts with {}", texts.len(), self.model_id());
        Ok(vectors)
    }

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let mut result = self.embed(&[text.to_string()]).await?;
        result
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".to_string()))
    }
}

/// Check count and dimension of a raw batch, then L2-normalize it.
///
/// A zero vector cannot be normalized and is reported as an inference
/// failure rather than passed on.
fn finish_batch(expected: usize, dimension: usize, raw: Vec<Embedding>) -> Result<Vec<Embedding>> {
    if raw.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "model returned {} embeddings for {expected} inputs",
            raw.len()
        )));
    }

    raw.into_iter()
        .map(|mut vector| {
            if vector.len() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if magnitude(&vector) == 0.0 || vector.iter().any(|x| !x.is_finite()) {
                return Err(EmbeddingError::Inference(
                    "model produced a degenerate vector".to_string(),
                ));
            }
            normalize(&mut vector);
            Ok(vector)
        })
        .collect()
}

/// Provider for OpenAI-compatible `/embeddings` endpoints.
///
/// Works with any server that speaks that wire format, including
/// sentence-transformers servers hosting all-MiniLM-L6-v2.
pub struct HttpProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Model name sent with every request.
    model: String,

    /// Expected output dimension.
    dimension: usize,

    /// Texts per request.
    batch_size: usize,

    /// Set once the warm-up probe succeeded.
    loaded: AtomicBool,
}

impl HttpProvider {
    /// Create a new HTTP provider.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok(),
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            client: reqwest::Client::new(),
            model: DEFAULT_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            batch_size: DEFAULT_BATCH_SIZE,
            loaded: AtomicBool::new(false),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the expected dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = clamp_batch_size(batch_size);
        self
    }
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn load(&self) -> Result<()> {
        let probe = self
            .embed_batch(&[WARMUP_TEXT.to_string()])
            .await
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("{}: {e}", self.model)))?;

        let actual = probe.first().map(Vec::len).unwrap_or_default();
        if actual != self.dimension {
            return Err(EmbeddingError::ModelUnavailable(format!(
                "{} produced {actual}-dimensional vectors, expected {}",
                self.model, self.dimension
            )));
        }

        self.loaded.store(true, Ordering::Release);
        info!("Loaded embedding model {} via {}", self.model, self.base_url);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Requesting {} embeddings with model: {}",
            texts.len(),
            self.model
        );

        let body = serde_json::json!({
            "input": texts,
            "model": self.model,
        });

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Inference(format!(
                "endpoint returned {status}: {error_text}"
            )));
        }

        let mut result: EmbeddingsResponse = response.json().await?;
        result.data.sort_by_key(|item| item.index);

        Ok(result.data.into_iter().map(|item| item.embedding).collect())
    }
}

/// OpenAI-compatible response format.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Offline provider based on signed feature hashing of word tokens.
///
/// Deterministic and dependency-free at runtime: each lowercase word is
/// hashed to a bucket and a sign. Texts sharing words end up close
/// together, which is enough for tests and air-gapped deployments.
pub struct HashingProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
    loaded: AtomicBool,
}

impl HashingProvider {
    /// Create a hashing provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: format!("feature-hash-v1-{dimension}"),
            dimension,
            batch_size: DEFAULT_BATCH_SIZE,
            loaded: AtomicBool::new(false),
        }
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = clamp_batch_size(batch_size);
        self
    }

    fn check_dimension(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(EmbeddingError::ModelUnavailable(
                "hashing provider needs a positive dimension".to_string(),
            ));
        }
        Ok(())
    }

    fn hash_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        vector
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn load(&self) -> Result<()> {
        self.check_dimension()?;
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.check_dimension()?;
        Ok(texts.iter().map(|text| self.hash_text(text)).collect())
    }
}
