//! Configuration for the document pipeline.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use docmatch_embeddings::provider::{DEFAULT_BATCH_SIZE, DEFAULT_MODEL, MAX_BATCH_SIZE};
use docmatch_embeddings::{
    DEFAULT_DIMENSION, EmbeddingProvider, HashingProvider, HttpProvider, IndexConfig, IndexKind,
};
use docmatch_normalize::NormalizerConfig;
use docmatch_uploads::UploadsConfig;

use crate::error::{PipelineError, Result};

/// Configuration for the document pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Text normalization policy.
    pub normalizer: NormalizerConfig,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Embedding cache configuration.
    pub cache: CacheConfig,

    /// Similarity index configuration.
    pub index: IndexConfig,

    /// Admission control.
    pub admission: AdmissionConfig,

    /// Uploads directory.
    pub uploads: UploadsConfig,
}

impl PipelineConfig {
    /// Parse a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|err| PipelineError::Config(err.to_string()))
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config = Self::from_toml_str(&source)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the normalizer configuration.
    pub fn with_normalizer(mut self, config: NormalizerConfig) -> Self {
        self.normalizer = config;
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Select the index implementation.
    pub fn with_index_kind(mut self, kind: IndexKind) -> Self {
        self.index.kind = kind;
        self
    }

    /// Set the admission limits.
    pub fn with_admission(mut self, config: AdmissionConfig) -> Self {
        self.admission = config;
        self
    }

    /// Set the uploads configuration.
    pub fn with_uploads(mut self, config: UploadsConfig) -> Self {
        self.uploads = config;
        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.normalizer.max_chars == 0 {
            return invalid("normalizer.max_chars must be positive");
        }
        if self.embedding.dimension == 0 {
            return invalid("embedding.dimension must be positive");
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.embedding.batch_size) {
            return invalid(&format!(
                "embedding.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.embedding.batch_size
            ));
        }
        if self.cache.capacity == 0 {
            return invalid("cache.capacity must be positive");
        }
        if self.admission.max_concurrent_inference == 0 {
            return invalid("admission.max_concurrent_inference must be positive");
        }
        if self.index.kind == IndexKind::Lsh {
            self.index
                .lsh
                .validate()
                .map_err(|err| PipelineError::Config(err.to_string()))?;
        }
        Ok(())
    }
}

fn invalid(message: &str) -> Result<()> {
    Err(PipelineError::Config(message.to_string()))
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: ProviderKind,

    /// Model to request from the HTTP endpoint.
    pub model: String,

    /// Base URL of the HTTP endpoint (None = provider default).
    pub base_url: Option<String>,

    /// API key for the HTTP endpoint. Falls back to the
    /// `DOCMATCH_EMBEDDING_API_KEY` environment variable.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Output dimension of the model.
    pub dimension: usize,

    /// Texts per inference request.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Http,
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            api_key: None,
            dimension: DEFAULT_DIMENSION,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl EmbeddingConfig {
    /// Offline feature-hashing provider with the given dimension.
    pub fn hashing(dimension: usize) -> Self {
        Self {
            provider: ProviderKind::Hashing,
            dimension,
            ..Default::default()
        }
    }

    /// Construct the configured provider. It still has to be loaded.
    pub fn build_provider(&self) -> Arc<dyn EmbeddingProvider> {
        match self.provider {
            ProviderKind::Http => {
                let mut provider = HttpProvider::new()
                    .with_model(&self.model)
                    .with_dimension(self.dimension)
                    .with_batch_size(self.batch_size);
                if let Some(url) = &self.base_url {
                    provider = provider.with_base_url(url);
                }
                if let Some(key) = &self.api_key {
                    provider = provider.with_api_key(key);
                }
                Arc::new(provider)
            }
            ProviderKind::Hashing => {
                Arc::new(HashingProvider::new(self.dimension).with_batch_size(self.batch_size))
            }
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible embeddings endpoint.
    Http,
    /// Local feature hashing, no model required.
    Hashing,
}

/// Configuration for the embedding cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached vectors.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: docmatch_embeddings::cache::DEFAULT_CAPACITY,
        }
    }
}

/// Limits on concurrent work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Inference calls allowed to run at once.
    pub max_concurrent_inference: usize,

    /// Requests allowed to wait for an inference slot. Beyond this,
    /// requests are rejected as overloaded.
    pub queue_depth: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_inference: 4,
            queue_depth: 64,
        }
    }
}
