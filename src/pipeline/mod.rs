//! The six-stage ingestion pipeline.
//!
//! Extract → Triage → Enrich → Quality Gate → Chunk → Store+Export, run
//! strictly in order for each document. STOP short-circuits later stages;
//! duplicate stops commit nothing, junk and gate stops persist a gated
//! metadata record and export with `gated: true`. The cancellation token
//! (carrying the per-document deadline) is checked at every stage
//! boundary, and nothing is committed after a check that observed
//! cancellation, so cancelled documents leave no partial writes.

pub mod cancel;
pub mod metrics;
mod result;
pub mod worker;

pub use cancel::CancellationToken;
pub use metrics::{Metrics, ProviderCost, Stats};
pub use result::{CostSummary, ErrorKind, IngestAction, IngestResult, IngestStatus};
pub use worker::{IngestWorkers, QueueFull};

use crate::chunk::{Chunk, Chunker};
use crate::config::PipelineConfig;
use crate::embed::Embedder;
use crate::enrich::{critic, EnrichedMetadata, Enricher, QualityScores, VocabularyService};
use crate::export::{NoteContext, VaultExporter};
use crate::extract::{Extractor, OcrEngine, OfficeConverter, PageRenderer, RawDocument};
use crate::gate;
use crate::llm::{CostRecord, FallbackChain};
use crate::store::{MetadataValue, Record, VectorStore};
use crate::triage::{
    Fingerprint, FuzzyIndex, Triage, TriageAction, TriageCategory, TriageDecision,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Fixed namespace for content-stable document ids: the same content hash
/// always maps to the same doc id, across retries and restarts.
const DOC_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6c, 0x6f, 0x61, 0x6d, 0x00, 0x64, 0x6f, 0x63, 0x00, 0x69, 0x64, 0x00, 0x00, 0x00, 0x00,
    0x01,
]);

/// Derive the stable document id from a content hash.
pub fn doc_id_for(content_sha256: &str) -> String {
    Uuid::new_v5(&DOC_ID_NAMESPACE, content_sha256.as_bytes()).to_string()
}

/// The assembled pipeline. Shared across workers behind `Arc`.
pub struct Pipeline {
    config: PipelineConfig,
    extractor: Extractor,
    triage: Triage,
    enricher: Enricher,
    chain: Arc<FallbackChain>,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    fuzzy: Arc<FuzzyIndex>,
    exporter: VaultExporter,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chain: Arc<FallbackChain>,
        vocabulary: Arc<VocabularyService>,
        vault_root: impl Into<std::path::PathBuf>,
    ) -> Self {
        let fuzzy = Arc::new(FuzzyIndex::new());
        let extractor = Extractor::new(config.max_document_chars, config.max_image_extractions)
            .with_vision(Arc::clone(&chain));
        let triage = Triage::new(
            Arc::clone(&store),
            Arc::clone(&fuzzy),
            config.duplicate_fuzzy_threshold,
        );
        let enricher = Enricher::new(
            Arc::clone(&chain),
            vocabulary,
            config.max_content_chars,
            config.recency_tau_days,
            config.enrichment_version.clone(),
        );
        let chunker = Chunker::new(config.chunk_target_tokens, config.chunk_max_tokens);
        let exporter = VaultExporter::new(vault_root, config.export_auto_link);

        Self {
            config,
            extractor,
            triage,
            enricher,
            chain,
            chunker,
            embedder,
            store,
            fuzzy,
            exporter,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.extractor = self.extractor.with_ocr(ocr);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.extractor = self.extractor.with_renderer(renderer);
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn OfficeConverter>) -> Self {
        self.extractor = self.extractor.with_converter(converter);
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.store)
    }

    /// Reload the fuzzy fingerprint index from the store. Called once at
    /// service startup so earlier runs participate in duplicate detection.
    pub async fn rebuild_fuzzy_index(&self) -> Result<(), crate::store::StoreError> {
        self.fuzzy.rebuild(self.store.as_ref()).await?;
        info!(entries = self.fuzzy.len(), "fuzzy fingerprint index rebuilt");
        Ok(())
    }

    /// Process one document under the configured per-document budget.
    pub async fn process(&self, raw: RawDocument, force: bool) -> IngestResult {
        let token = CancellationToken::with_deadline(Duration::from_secs(self.config.doc_budget_s));
        self.process_cancellable(raw, force, token).await
    }

    /// Process one document with an externally controlled token.
    pub async fn process_cancellable(
        &self,
        raw: RawDocument,
        force: bool,
        token: CancellationToken,
    ) -> IngestResult {
        let result = self.run(raw, force, &token).await;
        self.metrics.record_status(result.status.label());
        if let Some(kind) = result.error_kind {
            self.metrics.record_error(kind.label());
        }
        result
    }

    async fn run(&self, raw: RawDocument, force: bool, token: &CancellationToken) -> IngestResult {
        let ingested_at = Utc::now();
        let filename = raw.filename.clone();

        if let Some(result) = cancelled_result(token, "extract") {
            return result;
        }

        // --- Extract ---
        let doc = match self.extractor.extract(&raw, 0.0).await {
            Ok(doc) => doc,
            Err(e) => {
                return IngestResult::failed("extract", ErrorKind::Extraction, e.reason);
            }
        };
        let pending_attachments = doc.attachments.clone();
        let mut costs: Vec<CostRecord> = doc.page_cost.clone().into_iter().collect();

        if let Some(result) = cancelled_result(token, "triage") {
            return result;
        }

        // --- Triage ---
        let (mut fingerprint, decision) = if force {
            (Fingerprint::compute(&doc), forced_decision())
        } else {
            self.triage.decide(&doc).await
        };
        self.metrics.record_category(decision.category.label());
        let doc_id = doc_id_for(&fingerprint.content_sha256);

        if decision.action == TriageAction::Stop {
            match decision.category {
                TriageCategory::Duplicate | TriageCategory::NearDuplicate => {
                    debug!(doc_id = %doc_id, matched = ?decision.matched_doc_id, "duplicate, stopping");
                    return duplicate_result(&doc_id, &decision, pending_attachments);
                }
                // Junk continues on the gated path with no LLM spend.
                _ => {}
            }
        }
        let junk = decision.category == TriageCategory::Junk;

        if let Some(result) = cancelled_result(token, "enrich") {
            return result;
        }

        // --- Enrich (skipped entirely for junk) ---
        let metadata = if junk {
            let title = doc
                .title
                .clone()
                .unwrap_or_else(|| crate::enrich::validate::fallback_title(&filename, ingested_at));
            let mut shell = EnrichedMetadata::failed_shell(title, &self.config.enrichment_version);
            shell.enrichment_failed = false;
            shell
        } else {
            let outcome = self
                .enricher
                .enrich(&doc, &filename, Some(&decision), ingested_at, total_usd(&costs))
                .await;
            costs.extend(outcome.costs);
            outcome.metadata
        };
        fingerprint = fingerprint.with_entities(&metadata.canonical_entity_names());

        // --- Critic (optional) ---
        let critic_scores: Option<QualityScores> =
            if self.config.enable_critic && !junk && !metadata.enrichment_failed {
                match critic::review(&self.chain, &metadata, window(&doc.text), total_usd(&costs))
                    .await
                {
                    Ok((scores, cost)) => {
                        costs.push(cost);
                        Some(scores)
                    }
                    Err(e) => {
                        debug!(error = %e, "critic pass failed; continuing without scores");
                        None
                    }
                }
            } else {
                None
            };

        // --- Quality gate ---
        let gate_decision = gate::evaluate(
            &metadata,
            &decision,
            critic_scores.as_ref(),
            self.config.sigma_min,
            self.config.enable_gating,
        );
        let do_index = gate_decision.do_index;

        // --- Chunk ---
        let chunks = if do_index {
            self.chunker.chunk(&doc, &doc_id)
        } else {
            Vec::new()
        };

        if let Some(result) = cancelled_result(token, "store") {
            return result;
        }

        // --- Store (transactional per document) ---
        let chunk_records = match self.embed_chunks(&chunks, &metadata, &fingerprint, &doc_id, ingested_at).await
        {
            Ok(records) => records,
            Err(message) => {
                return with_costs(
                    IngestResult::failed("store", ErrorKind::Storage, message),
                    &costs,
                    pending_attachments,
                );
            }
        };
        let created_date = doc.created_date.unwrap_or(ingested_at);
        let document_record = self.document_record(
            &doc_id,
            &doc,
            &metadata,
            &fingerprint,
            &decision,
            do_index,
            created_date,
            ingested_at,
            &filename,
        );
        if let Err(e) = self.store.commit_document(document_record, chunk_records).await {
            return with_costs(
                IngestResult::failed("store", ErrorKind::Storage, e.to_string()),
                &costs,
                pending_attachments,
            );
        }
        self.fuzzy.insert(&doc_id, fingerprint.simhash);

        // --- Export (fail-open; the vector write stands) ---
        let note_context = NoteContext {
            doc_id: &doc_id,
            doc: &doc,
            metadata: &metadata,
            fingerprint: &fingerprint,
            triage_category: decision.category.label(),
            do_index,
            created_date,
            ingested_at,
            source_filename: &filename,
        };
        let export_path = self.exporter.export_fail_open(&note_context).await;
        if let Some(path) = &export_path {
            // Best-effort: attach the note path to the committed record.
            if let Ok(Some(mut record)) = self.store.get(crate::store::DOCUMENTS, &doc_id).await {
                record.metadata.insert(
                    "export_path".into(),
                    MetadataValue::Str(path.to_string_lossy().to_string()),
                );
                let _ = self.store.upsert(crate::store::DOCUMENTS, record).await;
            }
        }

        self.metrics.record_costs(&costs);
        self.metrics
            .record_suggestions(&metadata.suggested_vocabulary_additions);

        let status = if export_path.is_none() {
            self.metrics.record_error(ErrorKind::Export.label());
            IngestStatus::StoredUnexported
        } else {
            IngestStatus::Stored
        };
        info!(
            doc_id = %doc_id,
            status = status.label(),
            do_index,
            chunks = chunks.len(),
            "document processed"
        );

        IngestResult {
            doc_id: Some(doc_id),
            status,
            action: IngestAction::Unique,
            matched_doc_id: None,
            do_index,
            stage: None,
            error_kind: None,
            message: gate_decision.reason.map(|reason| reason.to_string()),
            chunks: chunks.len(),
            export_path,
            cost: CostSummary::from_records(&costs),
            pending_attachments,
        }
    }

    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        metadata: &EnrichedMetadata,
        fingerprint: &Fingerprint,
        doc_id: &str,
        ingested_at: DateTime<Utc>,
    ) -> Result<Vec<Record>, String> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| format!("embedding failed: {e}"))?;
        if vectors.len() != chunks.len() {
            return Err(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            ));
        }

        Ok(chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let mut record = Record::new(&chunk.chunk_id)
                    .with_vector(vector)
                    .set("doc_id", doc_id)
                    .set("sequence", chunk.sequence as i64)
                    .set("chunk_type", chunk.chunk_type.label())
                    .set("token_estimate", chunk.token_estimate as i64)
                    .set("text", chunk.text.clone())
                    .set("topics", MetadataValue::joined(&metadata.topics))
                    .set("projects", MetadataValue::joined(&metadata.projects))
                    .set("places", MetadataValue::joined(&metadata.places))
                    .set(
                        "people",
                        MetadataValue::joined(&labels(&metadata.people)),
                    )
                    .set(
                        "organizations",
                        MetadataValue::joined(&labels(&metadata.organizations)),
                    )
                    .set(
                        "technologies",
                        MetadataValue::joined(&labels(&metadata.technologies)),
                    )
                    .set(
                        "dates",
                        MetadataValue::joined(
                            &metadata
                                .dates
                                .iter()
                                .filter_map(|d| d.iso.clone())
                                .collect::<Vec<_>>(),
                        ),
                    )
                    .set("ingested_at", ingested_at.to_rfc3339())
                    .set("signalness", metadata.signalness)
                    .set("recency_score", metadata.recency_score)
                    .set("content_hash", fingerprint.content_sha256.as_str());
                if let Some(title) = &chunk.section_title {
                    record = record.set("section_title", title.as_str());
                }
                record
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn document_record(
        &self,
        doc_id: &str,
        doc: &crate::extract::ExtractedDocument,
        metadata: &EnrichedMetadata,
        fingerprint: &Fingerprint,
        decision: &TriageDecision,
        do_index: bool,
        created_date: DateTime<Utc>,
        ingested_at: DateTime<Utc>,
        filename: &str,
    ) -> Record {
        let mut record = Record::new(doc_id)
            .set("source", filename)
            .set("content_sha", fingerprint.content_sha256.as_str())
            .set("simhash", format!("{:016x}", fingerprint.simhash))
            .set("doc_type", doc.doc_type.label())
            .set("title", metadata.title.as_str())
            .set("triage_category", decision.category.label())
            .set("gated", !do_index)
            .set("signalness", metadata.signalness)
            .set("enrichment_version", metadata.enrichment_version.as_str())
            .set("enrichment_failed", metadata.enrichment_failed)
            .set("created_at", created_date.to_rfc3339())
            .set("ingested_at", ingested_at.to_rfc3339())
            .set("text", doc.text.as_str());
        if let Some(title_sha) = &fingerprint.title_sha {
            record = record.set("title_sha", title_sha.as_str());
        }
        if let Some(entity_sha) = &fingerprint.entity_set_sha {
            record = record.set("entity_set_sha", entity_sha.as_str());
        }
        if let Some(message_id) = &fingerprint.message_id {
            record = record.set("message_id", message_id.as_str());
        }
        if let Some(chat_head) = &fingerprint.chat_head_sha {
            record = record.set("chat_head_sha", chat_head.as_str());
        }
        record
    }
}

fn labels(entities: &[crate::enrich::EntityRef]) -> Vec<String> {
    entities
        .iter()
        .map(|e| e.display_label().to_string())
        .collect()
}

fn total_usd(costs: &[CostRecord]) -> f64 {
    costs.iter().map(|c| c.usd).sum()
}

fn window(text: &str) -> &str {
    match text.char_indices().nth(4000) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

fn forced_decision() -> TriageDecision {
    TriageDecision {
        category: TriageCategory::Archival,
        confidence: 0.5,
        reasoning: "triage bypassed by force flag".into(),
        action: TriageAction::Continue,
        matched_doc_id: None,
    }
}

fn cancelled_result(token: &CancellationToken, stage: &str) -> Option<IngestResult> {
    if !token.is_cancelled() {
        return None;
    }
    let result = if token.deadline_exceeded() {
        let mut r = IngestResult::failed(stage, ErrorKind::Budget, "document budget exceeded");
        r.status = IngestStatus::Timeout;
        r
    } else {
        let mut r = IngestResult::failed(stage, ErrorKind::Budget, "cancelled");
        r.status = IngestStatus::Cancelled;
        r.error_kind = None;
        r
    };
    Some(result)
}

fn duplicate_result(
    doc_id: &str,
    decision: &TriageDecision,
    pending_attachments: Vec<RawDocument>,
) -> IngestResult {
    let mut result = IngestResult::stored(doc_id);
    result.doc_id = decision.matched_doc_id.clone().or(Some(doc_id.to_string()));
    result.action = match decision.category {
        TriageCategory::NearDuplicate => IngestAction::NearDuplicate,
        _ => IngestAction::Duplicate,
    };
    result.matched_doc_id = decision.matched_doc_id.clone();
    result.do_index = false;
    result.pending_attachments = pending_attachments;
    result
}

fn with_costs(
    mut result: IngestResult,
    costs: &[CostRecord],
    pending_attachments: Vec<RawDocument>,
) -> IngestResult {
    result.cost = CostSummary::from_records(costs);
    result.pending_attachments = pending_attachments;
    result
}
