//! Transport-independent API layer.
//!
//! `IngestService` is the single entry point consumer layers (HTTP, batch
//! jobs) wrap. Transports never reach into the pipeline, store, or
//! exporter directly.

use crate::config::PipelineConfig;
use crate::embed::Embedder;
use crate::enrich::{VocabularyError, VocabularyService};
use crate::extract::RawDocument;
use crate::llm::FallbackChain;
use crate::pipeline::{
    CancellationToken, ErrorKind, IngestResult, IngestWorkers, Pipeline, Stats,
};
use crate::store::{StoreError, VectorStore, CHUNKS, DOCUMENTS};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// `stats()` payload: store counts plus process-wide totals.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub documents: usize,
    pub chunks: usize,
    #[serde(flatten)]
    pub totals: Stats,
}

/// Single consumer-facing entry point.
pub struct IngestService {
    pipeline: Arc<Pipeline>,
    workers: IngestWorkers,
    vocabulary: Arc<VocabularyService>,
}

impl IngestService {
    /// Assemble the pipeline, rebuild the fuzzy fingerprint index from the
    /// store, and start the worker pool.
    pub async fn start(
        config: PipelineConfig,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chain: Arc<FallbackChain>,
        vocabulary: Arc<VocabularyService>,
        vault_root: impl Into<std::path::PathBuf>,
    ) -> Result<Self, StoreError> {
        let worker_count = config.worker_concurrency;
        let capacity = config.ingest_queue_capacity;
        let pipeline = Arc::new(Pipeline::new(
            config,
            store,
            embedder,
            chain,
            Arc::clone(&vocabulary),
            vault_root,
        ));
        pipeline.rebuild_fuzzy_index().await?;
        let workers = IngestWorkers::start(Arc::clone(&pipeline), worker_count, capacity);
        Ok(Self {
            pipeline,
            workers,
            vocabulary,
        })
    }

    /// Access the assembled pipeline (tests, custom drivers).
    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Ingest one document inline under the per-document budget.
    pub async fn ingest(&self, raw: RawDocument) -> IngestResult {
        self.pipeline.process(raw, false).await
    }

    /// Ingest a batch through the bounded worker queue, preserving input
    /// order in the results.
    pub async fn batch_ingest(&self, raws: Vec<RawDocument>) -> Vec<IngestResult> {
        let budget = Duration::from_secs(self.pipeline.config().doc_budget_s);
        let mut receivers = Vec::with_capacity(raws.len());
        for raw in raws {
            let token = CancellationToken::with_deadline(budget);
            receivers.push(self.workers.submit(raw, false, token).await);
        }
        let mut results = Vec::with_capacity(receivers.len());
        for receiver in receivers {
            match receiver.await {
                Ok(result) => results.push(result),
                Err(_) => results.push(IngestResult::failed(
                    "queue",
                    ErrorKind::Storage,
                    "worker dropped the document",
                )),
            }
        }
        results
    }

    /// Re-run the pipeline for a stored document from its canonicalized
    /// text, bypassing duplicate detection and overwriting by chunk id.
    pub async fn reingest(&self, doc_id: &str) -> IngestResult {
        let record = match self.pipeline.store().get(DOCUMENTS, doc_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return IngestResult::failed(
                    "reingest",
                    ErrorKind::Validation,
                    format!("unknown doc_id {doc_id}"),
                )
            }
            Err(e) => return IngestResult::failed("reingest", ErrorKind::Storage, e.to_string()),
        };

        let Some(text) = record.str_field("text") else {
            return IngestResult::failed(
                "reingest",
                ErrorKind::Validation,
                "stored record has no text to replay",
            );
        };
        let filename = record
            .str_field("source")
            .unwrap_or("reingest.md")
            .to_string();
        let raw = RawDocument::new(text.as_bytes().to_vec(), filename)
            .with_declared_type("text/markdown");
        self.pipeline.process(raw, true).await
    }

    /// Store counts, per-status/category counters, and cost totals.
    pub async fn stats(&self) -> Result<ServiceStats, StoreError> {
        let store = self.pipeline.store();
        Ok(ServiceStats {
            documents: store.count(DOCUMENTS).await?,
            chunks: store.count(CHUNKS).await?,
            totals: self.pipeline.metrics().snapshot(),
        })
    }

    /// Hot-reload the controlled vocabulary from its source file.
    pub fn reload_vocabulary(&self) -> Result<(), VocabularyError> {
        self.vocabulary.reload()
    }

    /// Drain the queue and stop the workers.
    pub async fn shutdown(self) {
        self.workers.shutdown().await;
    }
}
