//! # Ingestion Orchestrator (C6)
//!
//! Drives one document through `Extract -> Chunk -> (Embed || ExtractEntities)
//! -> Write -> Validate -> MarkValidated`. Generalized from a conversational
//! turn loop (receive input, dispatch to NLU, fold into the knowledge base,
//! respond) into a concurrent, multi-document ingestion DAG with the same
//! bounded-worker-pool and explicit-phase-timeout shape.
//!
//! Concurrency is bounded by a [`tokio::sync::Semaphore`] sized
//! `config.workers` (already `min(cpus, 8)` by construction, per spec.md
//! §5). Each document's phases still run serially except for the
//! embed/entity-extraction fork, which runs concurrently via
//! [`tokio::join!`] (the two branches carry distinct error types, so
//! `try_join!` cannot unify them).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::chunking::{qualify, Chunker};
use crate::config::Config;
use crate::embed::Embedder;
use crate::error::{ChunkError, EmbedError, ErrorKind, ErrorLog, ErrorLogEntry, ExtractError, IngestError, NerError};
use crate::extract::{NoOpOcr, OcrFallback, PdfExtractor};
use crate::graph::{DocumentWrite, GraphStore};
use crate::model::{Chunk, Document, EntityType};
use crate::ner::Extractor as NerExtractor;

/// One document submitted for ingestion.
pub struct IngestRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub category: Option<String>,
    pub division: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document_id: String,
    pub chunk_count: usize,
}

/// Backoff schedule for retryable phase failures: 1s, 2s, 4s (spec.md §4.3/§4.6).
fn backoff_for(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(2))
}

pub struct Orchestrator<O: OcrFallback = NoOpOcr> {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    ner: Arc<NerExtractor>,
    extractor: Arc<PdfExtractor<O>>,
    chunker: Arc<Chunker>,
    config: Config,
    semaphore: Arc<Semaphore>,
    error_log: Arc<ErrorLog>,
}

impl Orchestrator<NoOpOcr> {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        config: Config,
        error_log_path: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self::with_extractor(store, embedder, Arc::new(PdfExtractor::default()), config, error_log_path)
    }
}

impl<O: OcrFallback + 'static> Orchestrator<O> {
    pub fn with_extractor(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<PdfExtractor<O>>,
        config: Config,
        error_log_path: impl Into<std::path::PathBuf>,
    ) -> Self {
        let workers = config.workers.max(1);
        let chunker = Arc::new(Chunker::new(&config));
        Self {
            store,
            embedder,
            ner: Arc::new(NerExtractor::new()),
            extractor,
            chunker,
            semaphore: Arc::new(Semaphore::new(workers)),
            config,
            error_log: Arc::new(ErrorLog::new(error_log_path)),
        }
    }

    /// Ingest many documents concurrently, bounded by the worker semaphore.
    /// Each document's result is independent: one failure never aborts the
    /// others (spec.md §5, "a slow or failing document must not stall the
    /// pool").
    pub async fn ingest_many(&self, requests: Vec<IngestRequest>) -> Vec<Result<IngestOutcome, IngestError>> {
        let mut handles = Vec::with_capacity(requests.len());
        for req in requests {
            let permit = self.semaphore.clone();
            let this = self.clone_shared();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                this.ingest_one(req).await
            }));
        }
        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            out.push(match h.await {
                Ok(r) => r,
                Err(join_err) => Err(join_panic_to_ingest_error(join_err)),
            });
        }
        out
    }

    fn clone_shared(&self) -> SharedOrchestrator<O> {
        SharedOrchestrator {
            store: self.store.clone(),
            embedder: self.embedder.clone(),
            ner: self.ner.clone(),
            extractor: self.extractor.clone(),
            chunker: self.chunker.clone(),
            config: self.config.clone(),
            error_log: self.error_log.clone(),
        }
    }

    /// Ingest a single document with retry-with-backoff on retryable phase
    /// errors (max `config.max_task_retries` attempts), rolling back any
    /// partial graph footprint on final failure.
    pub async fn ingest_one(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        self.clone_shared().ingest_one(request).await
    }
}

/// Per-task handle cloned into each spawned document job; holds only
/// `Arc`/`Clone` state so it can cross a `tokio::spawn` boundary.
struct SharedOrchestrator<O: OcrFallback> {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    ner: Arc<NerExtractor>,
    extractor: Arc<PdfExtractor<O>>,
    chunker: Arc<Chunker>,
    config: Config,
    error_log: Arc<ErrorLog>,
}

impl<O: OcrFallback + 'static> SharedOrchestrator<O> {
    async fn ingest_one(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        let document_id = request.filename.clone();
        let mut attempt = 0u32;

        loop {
            match self.try_ingest(&request).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    let kind = err.kind();
                    self.log_error(&document_id, phase_name(&err), kind, kind.is_retryable());
                    if kind.is_retryable() && attempt < self.config.max_task_retries {
                        warn!(document_id, attempt, %err, "retrying ingestion phase");
                        tokio::time::sleep(backoff_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    // No more retries: roll back any partial footprint from a
                    // prior attempt that may have reached the write phase.
                    if let Err(rollback_err) = self.store.delete_document_cascade(&document_id) {
                        warn!(document_id, %rollback_err, "rollback after failed ingestion found nothing to remove");
                    }
                    error!(document_id, %err, "ingestion failed permanently");
                    return Err(err);
                }
            }
        }
    }

    async fn try_ingest(&self, request: &IngestRequest) -> Result<IngestOutcome, IngestError> {
        let timeouts = &self.config.ingest_phase_timeouts_ms;

        let extractor = self.extractor.clone();
        let bytes = request.bytes.clone();
        let filename = request.filename.clone();
        let pages = run_phase(timeouts.extract, "extract", async move {
            tokio::task::spawn_blocking(move || extractor.extract(&bytes, &filename))
                .await
                .map_err(|e| ExtractError::Unreadable(format!("extraction task panicked: {e}")))?
        })
        .await?;

        let total_pages = pages.len();
        let chunker = self.chunker.clone();
        let pages_for_chunk = pages.clone();
        let raw_chunks = tokio::task::spawn_blocking(move || chunker.chunk_pages(&pages_for_chunk))
            .await
            .map_err(|e| ChunkError::InvariantViolation(format!("chunking task panicked: {e}")))??;

        let document_id = request.filename.clone();
        let qualified = qualify(&document_id, raw_chunks);
        let texts: Vec<String> = qualified.iter().map(|(_, c)| c.text.clone()).collect();

        let embedder = self.embedder.clone();
        let embed_texts = texts.clone();
        let embed_fut = run_phase(timeouts.embed, "embed", async move {
            tokio::task::spawn_blocking(move || embedder.encode_document(&embed_texts))
                .await
                .map_err(|e| EmbedError::ModelUnavailable(format!("embedding task panicked: {e}")))?
        });

        let ner = self.ner.clone();
        let ner_texts = texts.clone();
        let ner_fut = run_phase(timeouts.entities, "extract_entities", async move {
            tokio::task::spawn_blocking(move || {
                use rayon::prelude::*;
                ner_texts.par_iter().map(|t| ner.extract(t)).collect::<Vec<_>>()
            })
            .await
            .map_err(|_e| NerError::TimeoutExceeded)
        });

        // `tokio::join!` (not `try_join!`) since the two branches carry
        // distinct error types (`EmbedError` vs. `NerError`); each is
        // unwrapped into the shared `IngestError` below.
        let (embed_result, ner_result) = tokio::join!(embed_fut, ner_fut);
        let embeddings: Vec<Vec<f32>> = embed_result?;
        let entity_hits: Vec<Vec<crate::ner::ExtractedEntity>> = ner_result?;

        let mut chunks: Vec<Chunk> = Vec::with_capacity(qualified.len());
        let mut entity_links: Vec<(usize, String, String, EntityType, f32)> = Vec::new();
        for (idx, ((chunk_id, raw), embedding)) in qualified.into_iter().zip(embeddings).enumerate() {
            chunks.push(Chunk {
                id: chunk_id,
                doc_id: document_id.clone(),
                chunk_index: raw.chunk_index,
                page_num: raw.page_num,
                text: raw.text,
                embedding,
                semantic_density: raw.semantic_density,
                chunk_type: raw.chunk_type,
                has_definitions: raw.has_definitions,
                has_examples: raw.has_examples,
            });
            for hit in &entity_hits[idx] {
                entity_links.push((raw.chunk_index, hit.normalized.clone(), hit.surface.clone(), hit.entity_type, hit.confidence));
            }
        }

        let mut document = Document::new(document_id.clone(), total_pages);
        document.category = request.category.clone();
        document.division = request.division.clone();
        document.chunk_count = chunks.len();

        let chunk_count = chunks.len();
        let mean_chars_per_page = if total_pages == 0 {
            0.0
        } else {
            chunks.iter().map(|c| c.text.len()).sum::<usize>() as f32 / total_pages as f32
        };

        let store = self.store.clone();
        let write = DocumentWrite { document, chunks, entity_links };
        run_phase(timeouts.write, "write", async move {
            tokio::task::spawn_blocking(move || store.commit_document(write))
                .await
                .map_err(|e| crate::error::StoreError::Unavailable(format!("write task panicked: {e}")))?
        })
        .await?;

        self.validate(&document_id, total_pages, chunk_count, mean_chars_per_page)?;

        self.store.mark_validated(&document_id)?;
        info!(document_id, chunk_count, total_pages, "ingestion complete");
        Ok(IngestOutcome { document_id, chunk_count })
    }

    /// The four checks from spec.md §4.6: at least one chunk, coverage ratio
    /// above `min_chunk_page_ratio`, every page represented, and a minimum
    /// mean character density per page.
    fn validate(
        &self,
        document_id: &str,
        total_pages: usize,
        chunk_count: usize,
        mean_chars_per_page: f32,
    ) -> Result<(), IngestError> {
        let thresholds = &self.config.validation;

        if chunk_count == 0 {
            return Err(IngestError::ValidationFailed("document produced zero chunks".into()));
        }
        let ratio = chunk_count as f32 / total_pages.max(1) as f32;
        if ratio < thresholds.min_chunk_page_ratio {
            return Err(IngestError::ValidationFailed(format!(
                "chunk/page ratio {ratio:.3} below minimum {min}",
                min = thresholds.min_chunk_page_ratio
            )));
        }
        let chunks = self.store.chunks_for_document(document_id);
        let covered: std::collections::HashSet<usize> = chunks.iter().map(|c| c.page_num).collect();
        if covered.len() < total_pages {
            return Err(IngestError::ValidationFailed(format!(
                "only {covered} of {total_pages} pages covered by chunks",
                covered = covered.len()
            )));
        }
        if mean_chars_per_page < thresholds.min_chars_per_page {
            return Err(IngestError::ValidationFailed(format!(
                "mean chars/page {mean_chars_per_page:.1} below minimum {min}",
                min = thresholds.min_chars_per_page
            )));
        }
        Ok(())
    }

    fn log_error(&self, document_id: &str, phase: &str, kind: ErrorKind, retryable: bool) {
        let entry = ErrorLogEntry {
            document_id: document_id.to_string(),
            phase: phase.to_string(),
            error_kind: kind,
            timestamp: chrono::Utc::now(),
            retryable,
        };
        if let Err(e) = self.error_log.append(&entry) {
            warn!(document_id, %e, "failed to append to error log");
        }
    }
}

/// Wrap a phase future with its configured timeout, converting an elapsed
/// timeout into the phase's own `TimeoutExceeded` variant.
async fn run_phase<T, E, F>(timeout: Duration, phase: &str, fut: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
    E: PhaseTimeoutError,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(phase, timeout_ms = timeout.as_millis(), "phase exceeded its timeout budget");
            Err(E::timeout())
        }
    }
}

trait PhaseTimeoutError {
    fn timeout() -> Self;
}

impl PhaseTimeoutError for ExtractError {
    fn timeout() -> Self {
        ExtractError::TimeoutExceeded
    }
}

impl PhaseTimeoutError for EmbedError {
    fn timeout() -> Self {
        EmbedError::TimeoutExceeded
    }
}

impl PhaseTimeoutError for NerError {
    fn timeout() -> Self {
        NerError::TimeoutExceeded
    }
}

impl PhaseTimeoutError for crate::error::StoreError {
    fn timeout() -> Self {
        crate::error::StoreError::Unavailable("write phase timed out".into())
    }
}

fn phase_name(err: &IngestError) -> &'static str {
    match err {
        IngestError::Extract(_) => "extract",
        IngestError::Chunk(_) => "chunk",
        IngestError::Embed(_) => "embed",
        IngestError::Ner(_) => "extract_entities",
        IngestError::Store(_) => "write",
        IngestError::ValidationFailed(_) => "validate",
    }
}

fn join_panic_to_ingest_error(e: JoinError) -> IngestError {
    IngestError::Store(crate::error::StoreError::Unavailable(format!("ingestion task panicked: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use crate::graph::InMemoryGraphStore;

    fn test_config() -> Config {
        let mut cfg = Config::default();
        cfg.workers = 2;
        cfg.ingest_phase_timeouts_ms.extract = Duration::from_secs(5);
        cfg.ingest_phase_timeouts_ms.embed = Duration::from_secs(5);
        cfg.ingest_phase_timeouts_ms.entities = Duration::from_secs(5);
        cfg.ingest_phase_timeouts_ms.write = Duration::from_secs(5);
        cfg
    }

    #[test]
    fn validation_rejects_zero_chunks() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(8));
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(store, embedder, test_config(), dir.path().join("errors.jsonl"));
        let shared = orch.clone_shared();
        let result = shared.validate("doc1", 10, 0, 100.0);
        assert!(matches!(result, Err(IngestError::ValidationFailed(_))));
    }

    #[test]
    fn validation_rejects_low_chunk_page_ratio() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(8));
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(store, embedder, test_config(), dir.path().join("errors.jsonl"));
        let shared = orch.clone_shared();
        // 2 chunks over 76 pages is far below the 0.2 ratio floor.
        let result = shared.validate("doc1", 76, 2, 100.0);
        assert!(matches!(result, Err(IngestError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn backoff_schedule_matches_spec() {
        assert_eq!(backoff_for(0), Duration::from_secs(1));
        assert_eq!(backoff_for(1), Duration::from_secs(2));
        assert_eq!(backoff_for(2), Duration::from_secs(4));
    }

}
