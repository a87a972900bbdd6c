//! The document pipeline: ingestion, query and comparison.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docmatch_embeddings::similarity::{average, magnitude, normalize};
use docmatch_embeddings::{
    CacheStats, CachedVector, Embedding, EmbeddingCache, EmbeddingError, EmbeddingProvider,
    FingerprintNamespace, IndexError, IndexKind, SimilarityResult, VectorIndex, build_index,
};
use docmatch_normalize::{NormalizedText, TextNormalizer};
use docmatch_uploads::{SkippedFile, UploadScanner};

use crate::admission::{Admission, Ticket};
use crate::config::PipelineConfig;
use crate::document::{Document, DocumentRecord, IngestOutcome, IngestReceipt};
use crate::error::{PipelineError, Result, Subject};
use crate::matching::{MatchOptions, MatchReport, match_terms, score_percent, sort_reports};

/// Longest query prefix kept in error annotations.
const QUERY_PREVIEW_CHARS: usize = 80;

/// Index and document registry, updated together under one lock.
struct IndexState {
    index: Box<dyn VectorIndex>,
    documents: IndexMap<String, DocumentRecord>,
}

/// Ingests documents and answers similarity queries over them.
///
/// Every ingestion runs `normalize → fingerprint → cache or embed → commit`.
/// The commit inserts the vector and the registry record under one write
/// lock, so readers never see a document in one and not the other. Any
/// failure before the commit leaves the index untouched.
pub struct DocumentPipeline {
    /// Configuration.
    config: PipelineConfig,

    /// Text normalizer.
    normalizer: TextNormalizer,

    /// Loaded embedding provider.
    provider: Arc<dyn EmbeddingProvider>,

    /// Cache-key namespace: normalizer, model and dimension.
    namespace: FingerprintNamespace,

    /// Document and query vectors by fingerprint.
    cache: EmbeddingCache,

    /// Index and registry.
    state: RwLock<IndexState>,

    /// Queue and inference limits.
    admission: Admission,

    /// Cleared by `shutdown`.
    ready: AtomicBool,
}

impl DocumentPipeline {
    /// Validate `config`, load `provider` and build an empty index.
    ///
    /// Fails with [`PipelineError::ModelUnavailable`] if the provider cannot
    /// be loaded.
    pub async fn start(config: PipelineConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        if provider.dimension() != config.embedding.dimension {
            return Err(PipelineError::Config(format!(
                "provider {} produces {}-dimensional vectors, config expects {}",
                provider.model_id(),
                provider.dimension(),
                config.embedding.dimension
            )));
        }

        info!(
            "Loading embedding provider {} ({})",
            provider.name(),
            provider.model_id()
        );
        provider
            .load()
            .await
            .map_err(PipelineError::ModelUnavailable)?;

        let normalizer = TextNormalizer::new(config.normalizer.clone());
        let namespace = FingerprintNamespace::new(
            normalizer.model_version(),
            provider.model_id(),
            provider.dimension(),
        );
        let index = build_index(&config.index, provider.dimension())
            .map_err(|err| PipelineError::Config(err.to_string()))?;

        let pipeline = Self {
            cache: EmbeddingCache::new(config.cache.capacity),
            admission: Admission::new(&config.admission),
            state: RwLock::new(IndexState {
                index,
                documents: IndexMap::new(),
            }),
            normalizer,
            provider,
            namespace,
            config,
            ready: AtomicBool::new(true),
        };

        info!(
            "Document pipeline ready: model {}, dimension {}, {:?} index",
            pipeline.provider.model_id(),
            pipeline.provider.dimension(),
            pipeline.config.index.kind
        );
        Ok(pipeline)
    }

    /// Build the configured provider and start with it.
    pub async fn from_config(config: PipelineConfig) -> Result<Self> {
        let provider = config.embedding.build_provider();
        Self::start(config, provider).await
    }

    /// Whether the model is loaded and the pipeline accepts requests.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && self.provider.is_loaded()
    }

    /// Stop accepting requests and release the model.
    pub fn shutdown(&self) {
        if self.ready.swap(false, Ordering::AcqRel) {
            self.admission.close();
            self.provider.unload();
            info!("Document pipeline shut down");
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the normalizer.
    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(PipelineError::NotReady)
        }
    }

    /// Ingest a document. Without an id, a random one is assigned.
    ///
    /// Re-ingesting an id replaces its vector. Identical content reuses the
    /// cached vector.
    pub async fn ingest(&self, id: Option<String>, raw_text: &str) -> Result<IngestReceipt> {
        let id = id.unwrap_or_else(new_document_id);
        self.ensure_ready()?;
        let ticket = self.admission.admit()?;

        let normalized = self
            .normalizer
            .normalize(raw_text)
            .map_err(PipelineError::normalization(&Subject::Document(id.clone())))?;
        self.embed_and_commit(id, raw_text.to_string(), normalized, &ticket)
            .await
    }

    /// Ingest a document given as raw bytes. They must be UTF-8.
    pub async fn ingest_bytes(&self, id: String, raw: &[u8]) -> Result<IngestReceipt> {
        self.ensure_ready()?;
        let ticket = self.admission.admit()?;

        let normalized = self
            .normalizer
            .normalize_bytes(raw)
            .map_err(PipelineError::normalization(&Subject::Document(id.clone())))?;
        let raw_text = String::from_utf8_lossy(raw).into_owned();
        self.embed_and_commit(id, raw_text, normalized, &ticket).await
    }

    async fn embed_and_commit(
        &self,
        id: String,
        raw_text: String,
        normalized: NormalizedText,
        ticket: &Ticket,
    ) -> Result<IngestReceipt> {
        let subject = Subject::Document(id.clone());
        let fingerprint = self.namespace.fingerprint(normalized.as_str());
        let CachedVector { vector, source } = self
            .cache
            .get_or_compute(fingerprint, || {
                self.embed_units(&subject, &normalized.units, ticket)
            })
            .await?;

        let document = Document {
            id,
            raw_text,
            normalized_text: normalized.text,
            fingerprint,
            vector,
            created_at: chrono::Utc::now(),
        };
        let (record, vector) = document.into_parts();
        let id = record.id.clone();

        let mut state = self.state.write().await;
        state
            .index
            .insert(id.clone(), vector)
            .map_err(PipelineError::index(&subject))?;
        let replaced = state.documents.insert(id.clone(), record).is_some();
        drop(state);

        debug!("Ingested {id} ({source:?}, replaced: {replaced})");
        Ok(IngestReceipt {
            id,
            fingerprint,
            source,
            replaced,
        })
    }

    /// Embed every sentence unit and average them into one unit vector.
    async fn embed_units(
        &self,
        subject: &Subject,
        units: &[String],
        ticket: &Ticket,
    ) -> Result<Embedding> {
        let _slot = self.admission.inference_slot(ticket).await?;

        let vectors = self
            .provider
            .embed(units)
            .await
            .map_err(PipelineError::embedding(subject))?;
        let mut vector = average(&vectors).map_err(PipelineError::index(subject))?;
        if magnitude(&vector) == 0.0 {
            return Err(PipelineError::embedding(subject)(EmbeddingError::Inference(
                "sentence vectors cancel out".to_string(),
            )));
        }
        normalize(&mut vector);
        Ok(vector)
    }

    /// Ingest many documents, reporting each one's outcome in input order.
    pub async fn ingest_batch<I>(&self, items: I) -> Vec<IngestOutcome>
    where
        I: IntoIterator<Item = (Option<String>, String)>,
    {
        let outcomes: Vec<IngestOutcome> = stream::iter(items)
            .map(|(id, text)| {
                let id = id.unwrap_or_else(new_document_id);
                async move {
                    let result = self.ingest(Some(id.clone()), &text).await;
                    outcome(id, result)
                }
            })
            .buffered(self.batch_concurrency())
            .collect()
            .await;

        log_batch(&outcomes);
        outcomes
    }

    /// Scan the uploads directory and ingest every text file found, keyed
    /// by file name.
    pub async fn ingest_uploads(&self) -> Result<UploadsReport> {
        self.ensure_ready()?;
        let scanner = UploadScanner::new(self.config.uploads.clone())?;
        let scan = scanner.scan().await?;

        let outcomes: Vec<IngestOutcome> = stream::iter(scan.documents)
            .map(|upload| async move {
                let result = self.ingest_bytes(upload.id.clone(), &upload.bytes).await;
                outcome(upload.id, result)
            })
            .buffered(self.batch_concurrency())
            .collect()
            .await;

        log_batch(&outcomes);
        Ok(UploadsReport {
            outcomes,
            skipped: scan.skipped,
        })
    }

    fn batch_concurrency(&self) -> usize {
        self.config.admission.max_concurrent_inference.max(1)
    }

    /// The `k` indexed documents most similar to `query_text`.
    ///
    /// An empty result means nothing is indexed.
    pub async fn query(&self, query_text: &str, k: usize) -> Result<Vec<SimilarityResult>> {
        let subject = Subject::Query(preview(query_text));
        self.ensure_ready()?;
        if k == 0 {
            return Err(PipelineError::index(&subject)(IndexError::InvalidK));
        }
        let ticket = self.admission.admit()?;

        let normalized = self
            .normalizer
            .normalize(query_text)
            .map_err(PipelineError::normalization(&subject))?;
        let fingerprint = self.namespace.fingerprint(normalized.as_str());
        let CachedVector { vector, .. } = self
            .cache
            .get_or_compute(fingerprint, || {
                self.embed_units(&subject, &normalized.units, &ticket)
            })
            .await?;

        let state = self.state.read().await;
        let results = state
            .index
            .search(&vector, k)
            .map_err(PipelineError::index(&subject))?;
        debug!("Query returned {} of {} documents", results.len(), state.index.len());
        Ok(results)
    }

    /// The `k` documents most similar to an indexed one, excluding itself.
    pub async fn search_by_id(&self, id: &str, k: usize) -> Result<Vec<SimilarityResult>> {
        let subject = Subject::Document(id.to_string());
        self.ensure_ready()?;
        if k == 0 {
            return Err(PipelineError::index(&subject)(IndexError::InvalidK));
        }

        let state = self.state.read().await;
        let vector = state
            .index
            .get(id)
            .ok_or_else(|| PipelineError::UnknownDocument(id.to_string()))?;
        let mut results = state
            .index
            .search(vector, k.saturating_add(1))
            .map_err(PipelineError::index(&subject))?;
        results.retain(|result| result.id != id);
        results.truncate(k);
        Ok(results)
    }

    /// Cosine similarity between two indexed documents.
    pub async fn pairwise(&self, a: &str, b: &str) -> Result<f32> {
        self.ensure_ready()?;
        let state = self.state.read().await;
        state
            .index
            .pairwise(a, b)
            .map_err(PipelineError::index(&Subject::Pair(a.to_string(), b.to_string())))
    }

    /// Compare `source_id` against `target_ids` (every other document when
    /// empty) and report score and key-term overlap for each.
    ///
    /// Matched terms are the target's key terms found in the source;
    /// containment in either direction counts as a match.
    pub async fn compare(
        &self,
        source_id: &str,
        target_ids: &[String],
        options: &MatchOptions,
    ) -> Result<Vec<MatchReport>> {
        self.ensure_ready()?;
        let state = self.state.read().await;

        let source = state
            .documents
            .get(source_id)
            .ok_or_else(|| PipelineError::UnknownDocument(source_id.to_string()))?;
        let source_terms = self.normalizer.key_terms(&source.normalized_text);

        let targets: Vec<&str> = if target_ids.is_empty() {
            state
                .documents
                .keys()
                .map(String::as_str)
                .filter(|id| *id != source_id)
                .collect()
        } else {
            target_ids.iter().map(String::as_str).collect()
        };

        let mut reports = Vec::with_capacity(targets.len());
        for target_id in targets {
            let target = state
                .documents
                .get(target_id)
                .ok_or_else(|| PipelineError::UnknownDocument(target_id.to_string()))?;
            let cosine = state.index.pairwise(source_id, target_id).map_err(
                PipelineError::index(&Subject::Pair(
                    source_id.to_string(),
                    target_id.to_string(),
                )),
            )?;

            let target_terms = self.normalizer.key_terms(&target.normalized_text);
            let (matched_terms, missing_terms) = match_terms(&source_terms, &target_terms);
            let report = MatchReport {
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
                score_percent: score_percent(cosine),
                matched_terms,
                missing_terms,
                source_timeline: source.timeline.clone(),
            };
            if options.accepts(&report) {
                reports.push(report);
            }
        }

        sort_reports(&mut reports, options.sort_by);
        Ok(reports)
    }

    /// Delete a document from the index and registry.
    pub async fn remove(&self, id: &str) -> Result<DocumentRecord> {
        self.ensure_ready()?;
        let mut state = self.state.write().await;
        let record = state
            .documents
            .shift_remove(id)
            .ok_or_else(|| PipelineError::UnknownDocument(id.to_string()))?;
        if !state.index.remove(id) {
            warn!("Document {id} was registered but not indexed");
        }
        info!("Removed document {id}");
        Ok(record)
    }

    /// Registry record for a document.
    pub async fn get(&self, id: &str) -> Option<DocumentRecord> {
        self.state.read().await.documents.get(id).cloned()
    }

    /// Ids of indexed documents in insertion order.
    pub async fn ids(&self) -> Vec<String> {
        self.state.read().await.documents.keys().cloned().collect()
    }

    /// Number of indexed documents.
    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    /// Whether no documents are indexed.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get pipeline statistics.
    pub async fn stats(&self) -> PipelineStats {
        let documents = self.len().await;
        PipelineStats {
            ready: self.is_ready(),
            documents,
            model: self.provider.model_id().to_string(),
            normalizer: self.normalizer.model_version(),
            dimension: self.provider.dimension(),
            index_kind: self.config.index.kind,
            admitted: self.admission.in_flight(),
            admission_capacity: self.admission.capacity(),
            cache: self.cache.stats(),
        }
    }
}

/// Result of [`DocumentPipeline::ingest_uploads`].
#[derive(Debug)]
pub struct UploadsReport {
    /// One outcome per uploaded document.
    pub outcomes: Vec<IngestOutcome>,

    /// Files the scanner could not load.
    pub skipped: Vec<SkippedFile>,
}

/// Statistics about the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Whether requests are accepted.
    pub ready: bool,

    /// Number of indexed documents.
    pub documents: usize,

    /// Embedding model id.
    pub model: String,

    /// Normalizer model version.
    pub normalizer: String,

    /// Vector dimension.
    pub dimension: usize,

    /// Index implementation.
    pub index_kind: IndexKind,

    /// Requests currently admitted.
    pub admitted: usize,

    /// Maximum admitted requests.
    pub admission_capacity: usize,

    /// Cache statistics.
    pub cache: CacheStats,
}

fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

fn outcome(id: String, result: Result<IngestReceipt>) -> IngestOutcome {
    match result {
        Ok(receipt) => IngestOutcome::Ingested(receipt),
        Err(error) => {
            warn!("Failed to ingest {id}: {error}");
            IngestOutcome::Failed { id, error }
        }
    }
}

fn log_batch(outcomes: &[IngestOutcome]) {
    let ingested = outcomes.iter().filter(|o| o.is_ingested()).count();
    info!(
        "Batch ingestion: {ingested} ingested, {} failed",
        outcomes.len() - ingested
    );
}

fn preview(text: &str) -> String {
    if text.chars().count() <= QUERY_PREVIEW_CHARS {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(QUERY_PREVIEW_CHARS).collect();
    preview.push('…');
    preview
}
