use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use docmatch_embeddings::{
    Embedding, EmbeddingError, EmbeddingProvider, HashingProvider, IndexError, IndexKind,
    VectorSource,
};
use docmatch_normalize::{NormalizationError, Period};
use docmatch_pipeline::{
    AdmissionConfig, DocumentPipeline, EmbeddingConfig, ErrorKind, IngestOutcome, MatchOptions,
    PipelineConfig, PipelineError, SortBy,
};
use docmatch_uploads::UploadsConfig;

const DIMENSION: usize = 1024;

fn config() -> PipelineConfig {
    PipelineConfig::default().with_embedding(EmbeddingConfig::hashing(DIMENSION))
}

async fn pipeline() -> DocumentPipeline {
    DocumentPipeline::from_config(config()).await.unwrap()
}

async fn cat_corpus() -> DocumentPipeline {
    let pipeline = pipeline().await;
    for (id, text) in [
        ("d1", "The cat sat on the mat."),
        ("d2", "A cat was sitting on a mat."),
        ("d3", "Stock markets rallied today."),
    ] {
        pipeline.ingest(Some(id.to_string()), text).await.unwrap();
    }
    pipeline
}

/// Hashing provider that sleeps on every batch and counts calls.
struct SlowProvider {
    inner: HashingProvider,
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowProvider {
    fn new(delay: Duration) -> Self {
        Self {
            inner: HashingProvider::new(DIMENSION),
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }

    async fn load(&self) -> docmatch_embeddings::Result<()> {
        self.inner.load().await
    }

    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    fn unload(&self) {
        self.inner.unload();
    }

    async fn embed_batch(&self, texts: &[String]) -> docmatch_embeddings::Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.embed_batch(texts).await
    }
}

/// Hashing provider whose inference fails on any text containing `marker`.
struct FlakyProvider {
    inner: HashingProvider,
    marker: &'static str,
}

#[async_trait]
impl EmbeddingProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }

    async fn load(&self) -> docmatch_embeddings::Result<()> {
        self.inner.load().await
    }

    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    fn unload(&self) {
        self.inner.unload();
    }

    async fn embed_batch(&self, texts: &[String]) -> docmatch_embeddings::Result<Vec<Embedding>> {
        if texts.iter().any(|text| text.contains(self.marker)) {
            return Err(EmbeddingError::Inference("tensor shape mismatch".to_string()));
        }
        self.inner.embed_batch(texts).await
    }
}

/// Provider whose model never loads.
struct BrokenProvider;

#[async_trait]
impl EmbeddingProvider for BrokenProvider {
    fn name(&self) -> &str {
        "broken"
    }

    fn model_id(&self) -> &str {
        "broken"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn batch_size(&self) -> usize {
        1
    }

    async fn load(&self) -> docmatch_embeddings::Result<()> {
        Err(EmbeddingError::ModelUnavailable(
            "weights missing".to_string(),
        ))
    }

    fn is_loaded(&self) -> bool {
        false
    }

    fn unload(&self) {}

    async fn embed_batch(&self, _texts: &[String]) -> docmatch_embeddings::Result<Vec<Embedding>> {
        Err(EmbeddingError::ModelUnavailable("not loaded".to_string()))
    }
}

#[tokio::test]
async fn test_cat_on_mat_query() {
    let pipeline = cat_corpus().await;

    let results = pipeline.query("cat on mat", 2).await.unwrap();
    let ids: HashSet<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["d1", "d2"]));
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn test_exact_and_lsh_agree_on_scenario() {
    let exact = cat_corpus().await;
    let lsh = DocumentPipeline::from_config(config().with_index_kind(IndexKind::Lsh))
        .await
        .unwrap();
    for id in exact.ids().await {
        let record = exact.get(&id).await.unwrap();
        lsh.ingest(Some(id), &record.normalized_text).await.unwrap();
    }

    let from_exact = exact.query("cat on mat", 3).await.unwrap();
    let from_lsh = lsh.query("cat on mat", 3).await.unwrap();
    assert_eq!(from_exact.len(), from_lsh.len());
    assert_eq!(from_exact[0].id, from_lsh[0].id);
}

#[tokio::test]
async fn test_duplicate_ingestion_is_idempotent() {
    let pipeline = pipeline().await;

    let first = pipeline
        .ingest(Some("d1".to_string()), "The cat sat on the mat.")
        .await
        .unwrap();
    let cache_size = pipeline.stats().await.cache.entries;

    let second = pipeline
        .ingest(Some("d1".to_string()), "The cat sat on the mat.")
        .await
        .unwrap();

    assert_eq!(first.source, VectorSource::Computed);
    assert_eq!(second.source, VectorSource::Cache);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert!(second.replaced);
    assert_eq!(pipeline.stats().await.cache.entries, cache_size);
    assert_eq!(pipeline.len().await, 1);
}

#[tokio::test]
async fn test_identical_content_shares_vector() {
    let pipeline = pipeline().await;
    pipeline
        .ingest(Some("a".to_string()), "Rust services in production.")
        .await
        .unwrap();
    let receipt = pipeline
        .ingest(Some("b".to_string()), "Rust   services in\tproduction.")
        .await
        .unwrap();

    assert_eq!(receipt.source, VectorSource::Cache);
    assert!((pipeline.pairwise("a", "b").await.unwrap() - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_k_larger_than_index_returns_all() {
    let pipeline = cat_corpus().await;
    let results = pipeline.query("cat", 10).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_zero_k_is_an_index_error() {
    let pipeline = cat_corpus().await;
    let err = pipeline.query("cat", 0).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Index {
            source: IndexError::InvalidK,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::IndexState);
}

#[tokio::test]
async fn test_empty_index_returns_no_results() {
    let pipeline = pipeline().await;
    assert_eq!(pipeline.query("anything at all", 5).await.unwrap(), vec![]);
}

#[tokio::test]
async fn test_assigns_id_when_missing() {
    let pipeline = pipeline().await;
    let receipt = pipeline.ingest(None, "Unnamed document.").await.unwrap();

    assert!(!receipt.id.is_empty());
    assert!(pipeline.get(&receipt.id).await.is_some());
}

#[tokio::test]
async fn test_normalization_error_is_annotated_and_leaves_no_entry() {
    let pipeline = pipeline().await;
    let err = pipeline
        .ingest(Some("blank".to_string()), " \n\t ")
        .await
        .unwrap_err();

    match &err {
        PipelineError::Normalization { subject, source } => {
            assert_eq!(subject.document_id(), Some("blank"));
            assert_eq!(source, &NormalizationError::Empty);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Normalization);
    assert!(pipeline.is_empty().await);
}

#[tokio::test]
async fn test_invalid_utf8_rejected() {
    let pipeline = pipeline().await;
    let err = pipeline
        .ingest_bytes("bin".to_string(), &[0x66, 0xff, 0x66])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Normalization);
    assert!(pipeline.get("bin").await.is_none());
}

#[tokio::test]
async fn test_pairwise_and_search_by_id() {
    let pipeline = cat_corpus().await;

    let self_score = pipeline.pairwise("d1", "d1").await.unwrap();
    let other_score = pipeline.pairwise("d1", "d3").await.unwrap();
    assert!((self_score - 1.0).abs() < 1e-6);
    assert!(self_score >= other_score);

    let similar = pipeline.search_by_id("d1", 5).await.unwrap();
    assert_eq!(similar.len(), 2);
    assert_eq!(similar[0].id, "d2");
    assert!(similar.iter().all(|r| r.id != "d1"));

    assert!(matches!(
        pipeline.pairwise("d1", "nope").await,
        Err(PipelineError::Index {
            source: IndexError::NotFound(_),
            ..
        })
    ));
    assert!(matches!(
        pipeline.search_by_id("nope", 1).await,
        Err(PipelineError::UnknownDocument(_))
    ));
}

#[tokio::test]
async fn test_remove() {
    let pipeline = cat_corpus().await;

    let record = pipeline.remove("d2").await.unwrap();
    assert_eq!(record.id, "d2");
    assert_eq!(pipeline.ids().await, vec!["d1", "d3"]);

    let results = pipeline.query("cat on mat", 5).await.unwrap();
    assert!(results.iter().all(|r| r.id != "d2"));
    assert!(matches!(
        pipeline.remove("d2").await,
        Err(PipelineError::UnknownDocument(_))
    ));
}

#[tokio::test]
async fn test_ingest_batch_reports_each_document() {
    let pipeline = pipeline().await;
    let outcomes = pipeline
        .ingest_batch(vec![
            (Some("ok".to_string()), "A perfectly fine document.".to_string()),
            (Some("empty".to_string()), "   ".to_string()),
            (None, "Another fine document.".to_string()),
        ])
        .await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].id(), "ok");
    assert!(outcomes[0].is_ingested());
    assert!(matches!(
        &outcomes[1],
        IngestOutcome::Failed { id, error } if id == "empty" && error.kind() == ErrorKind::Normalization
    ));
    assert!(outcomes[2].is_ingested());
    assert_eq!(pipeline.len().await, 2);
}

#[tokio::test]
async fn test_inference_failure_is_reported_per_document() {
    let provider = Arc::new(FlakyProvider {
        inner: HashingProvider::new(DIMENSION),
        marker: "CORRUPT",
    });
    let pipeline = DocumentPipeline::start(config(), provider).await.unwrap();

    let outcomes = pipeline
        .ingest_batch(vec![
            (Some("first".to_string()), "The first document is fine.".to_string()),
            (
                Some("broken".to_string()),
                "This one is fine. This one is CORRUPT beyond repair.".to_string(),
            ),
            (Some("last".to_string()), "The last document is fine too.".to_string()),
        ])
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ingested());
    assert!(matches!(
        &outcomes[1],
        IngestOutcome::Failed { id, error } if id == "broken" && error.kind() == ErrorKind::Inference
    ));
    assert!(outcomes[2].is_ingested());

    assert!(pipeline.get("broken").await.is_none());
    assert_eq!(pipeline.len().await, 2);

    let stats = pipeline.stats().await;
    assert_eq!(stats.cache.entries, 2);
    assert_eq!(stats.cache.in_flight, 0);

    let err = pipeline
        .ingest(Some("again".to_string()), "Still CORRUPT.")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Embedding { .. }));
    assert_eq!(err.subject().map(ToString::to_string), Some("document again".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingestion_of_same_text_embeds_once() {
    let provider = Arc::new(SlowProvider::new(Duration::from_millis(50)));
    let pipeline = Arc::new(
        DocumentPipeline::start(config(), provider.clone())
            .await
            .unwrap(),
    );

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .ingest(Some(format!("copy-{i}")), "Same words in every copy.")
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.len().await, 8);
    assert_eq!(pipeline.stats().await.cache.entries, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overload_is_rejected() {
    let provider = Arc::new(SlowProvider::new(Duration::from_millis(300)));
    let config = config().with_admission(AdmissionConfig {
        max_concurrent_inference: 1,
        queue_depth: 0,
    });
    let pipeline = Arc::new(DocumentPipeline::start(config, provider).await.unwrap());

    let busy = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline
                .ingest(Some("first".to_string()), "Takes a while to embed.")
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = pipeline
        .ingest(Some("second".to_string()), "Arrives while busy.")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Overloaded { capacity: 1 }));
    assert_eq!(err.kind(), ErrorKind::Rejected);

    busy.await.unwrap().unwrap();
    assert!(pipeline.get("second").await.is_none());
    pipeline
        .ingest(Some("second".to_string()), "Arrives after the rush.")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancelled_ingest_leaves_nothing() {
    let provider = Arc::new(SlowProvider::new(Duration::from_secs(60)));
    let pipeline = DocumentPipeline::start(config(), provider).await.unwrap();

    let attempt = tokio::time::timeout(
        Duration::from_millis(20),
        pipeline.ingest(Some("slow".to_string()), "Never finishes."),
    )
    .await;
    assert!(attempt.is_err());

    let stats = pipeline.stats().await;
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.cache.entries, 0);
    assert_eq!(stats.cache.in_flight, 0);
    assert_eq!(stats.admitted, 0);
}

#[tokio::test]
async fn test_model_unavailable_is_fatal() {
    let err = DocumentPipeline::start(config(), Arc::new(BrokenProvider))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::ModelUnavailable(_)));
    assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
}

#[tokio::test]
async fn test_dimension_mismatch_with_config() {
    let provider = Arc::new(HashingProvider::new(DIMENSION * 2));
    let err = DocumentPipeline::start(config(), provider)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[tokio::test]
async fn test_shutdown() {
    let pipeline = cat_corpus().await;
    assert!(pipeline.is_ready());

    pipeline.shutdown();
    assert!(!pipeline.is_ready());
    assert!(matches!(
        pipeline.ingest(None, "Too late.").await,
        Err(PipelineError::NotReady)
    ));
    assert!(matches!(
        pipeline.query("cat", 1).await,
        Err(PipelineError::NotReady)
    ));
}

#[tokio::test]
async fn test_compare_reports() {
    let pipeline = pipeline().await;
    pipeline
        .ingest(
            Some("resume.txt".to_string()),
            "Backend engineer. Built services in Rust with tokio and PostgreSQL.",
        )
        .await
        .unwrap();
    pipeline
        .ingest(
            Some("backend.txt".to_string()),
            "We need a Rust engineer who knows tokio and Postgres.",
        )
        .await
        .unwrap();
    pipeline
        .ingest(
            Some("design.txt".to_string()),
            "Graphic designer for print campaigns.",
        )
        .await
        .unwrap();

    let reports = pipeline
        .compare("resume.txt", &[], &MatchOptions::default())
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].target_id, "backend.txt");
    assert!(reports[0].score_percent > reports[1].score_percent);
    assert!(reports[0].matched_terms.contains(&"rust".to_string()));
    assert!(reports[0].matched_terms.contains(&"postgres".to_string()));
    assert!(reports[1].missing_terms.contains(&"graphic".to_string()));

    let filtered = pipeline
        .compare(
            "resume.txt",
            &["design.txt".to_string(), "backend.txt".to_string()],
            &MatchOptions::default()
                .with_min_matched_terms(2)
                .with_sort_by(SortBy::Name),
        )
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].target_id, "backend.txt");

    assert!(matches!(
        pipeline
            .compare("resume.txt", &["missing.txt".to_string()], &MatchOptions::default())
            .await,
        Err(PipelineError::UnknownDocument(_))
    ));
}

#[tokio::test]
async fn test_compare_carries_source_timeline() {
    let pipeline = pipeline().await;
    pipeline
        .ingest(
            Some("resume.txt".to_string()),
            "Education\n\
             BSc Computer Science, State University, 2010 - 2014\n\
             Experience\n\
             Initech, Rust engineer, Jan 2015 - Dec 2016\n\
             Acme Corp, Rust engineer, Jun 2017 - Present\n",
        )
        .await
        .unwrap();
    pipeline
        .ingest(Some("job.txt".to_string()), "Hiring a Rust engineer.")
        .await
        .unwrap();

    let reports = pipeline
        .compare("resume.txt", &[], &MatchOptions::default())
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);

    let timeline = &reports[0].source_timeline;
    assert_eq!(timeline.education.len(), 1);
    let labels: Vec<String> = timeline.experience.iter().map(Period::label).collect();
    assert_eq!(labels, vec!["Jan 2015 - Dec 2016", "Jun 2017 - Present"]);
    assert_eq!(timeline.experience[0].entry, "Initech, Rust engineer");
    assert_eq!(timeline.experience_gaps.len(), 1);
    assert_eq!(timeline.experience_gaps[0].months, 5);
    assert_eq!(timeline.education_to_first_job_months, Some(0));

    let record = pipeline.get("resume.txt").await.unwrap();
    assert_eq!(&record.timeline, timeline);
    assert!(pipeline.get("job.txt").await.unwrap().timeline.is_empty());
}

#[tokio::test]
async fn test_ingest_uploads() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("resume.txt"), "Rust engineer with tokio.").unwrap();
    std::fs::write(dir.path().join("job.md"), "Hiring a Rust engineer.").unwrap();
    std::fs::write(dir.path().join("empty.txt"), "\n\n").unwrap();
    std::fs::write(dir.path().join("scan.pdf"), b"%PDF-1.4").unwrap();

    let pipeline = DocumentPipeline::from_config(config().with_uploads(UploadsConfig::new(dir.path())))
        .await
        .unwrap();
    let report = pipeline.ingest_uploads().await.unwrap();

    let ingested: Vec<&str> = report
        .outcomes
        .iter()
        .filter(|o| o.is_ingested())
        .map(IngestOutcome::id)
        .collect();
    assert_eq!(ingested, vec!["job.md", "resume.txt"]);
    assert_eq!(report.outcomes.len(), 3);
    let mut ids = pipeline.ids().await;
    ids.sort();
    assert_eq!(ids, vec!["job.md", "resume.txt"]);

    let results = pipeline.query("rust engineer", 1).await.unwrap();
    assert_eq!(results.len(), 1);
}
