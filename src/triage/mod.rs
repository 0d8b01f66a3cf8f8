//! Triage stage: decide whether to spend LLM budget on a document.
//!
//! Computes fingerprints, looks up exact keys in the document metadata
//! index, consults the fuzzy SimHash index for near-duplicates, then walks
//! the decision ladder. Triage is fail-open: any internal error yields
//! CONTINUE with category archival so a triage bug never loses documents.

pub mod fingerprint;
pub mod rules;

pub use fingerprint::{normalize_text, sha256_hex, simhash_similarity, Fingerprint};
pub use rules::{ActionableKind, JunkReason};

use crate::extract::ExtractedDocument;
use crate::store::{MetadataFilter, StoreError, VectorStore, DOCUMENTS};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Triage verdict category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageCategory {
    Unique,
    Duplicate,
    NearDuplicate,
    Junk,
    Financial,
    Legal,
    Medical,
    Scheduling,
    Archival,
}

impl TriageCategory {
    pub fn label(&self) -> &'static str {
        match self {
            TriageCategory::Unique => "unique",
            TriageCategory::Duplicate => "duplicate",
            TriageCategory::NearDuplicate => "near_duplicate",
            TriageCategory::Junk => "junk",
            TriageCategory::Financial => "financial",
            TriageCategory::Legal => "legal",
            TriageCategory::Medical => "medical",
            TriageCategory::Scheduling => "scheduling",
            TriageCategory::Archival => "archival",
        }
    }
}

impl From<ActionableKind> for TriageCategory {
    fn from(kind: ActionableKind) -> Self {
        match kind {
            ActionableKind::Financial => TriageCategory::Financial,
            ActionableKind::Legal => TriageCategory::Legal,
            ActionableKind::Medical => TriageCategory::Medical,
            ActionableKind::Scheduling => TriageCategory::Scheduling,
        }
    }
}

/// Whether the pipeline continues past triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageAction {
    Continue,
    Stop,
}

/// The gating verdict merged into the pipeline context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageDecision {
    pub category: TriageCategory,
    /// Confidence in [0,1].
    pub confidence: f64,
    pub reasoning: String,
    pub action: TriageAction,
    /// Committed twin for duplicate / near-duplicate verdicts.
    pub matched_doc_id: Option<String>,
}

/// Internal triage failure. Never propagates: the caller fails open.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("store lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// In-memory SimHash index over committed documents.
///
/// Rebuilt from the document collection at startup; updated as documents
/// commit. Linear Hamming scan: the document collection is orders of
/// magnitude smaller than the chunk collection.
#[derive(Default)]
pub struct FuzzyIndex {
    hashes: DashMap<String, u64>,
}

impl FuzzyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc_id: impl Into<String>, simhash: u64) {
        self.hashes.insert(doc_id.into(), simhash);
    }

    pub fn remove(&self, doc_id: &str) {
        self.hashes.remove(doc_id);
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Most similar committed document at or above the threshold.
    pub fn nearest(&self, simhash: u64, min_similarity: f64) -> Option<(String, f64)> {
        let mut best: Option<(String, f64)> = None;
        for entry in self.hashes.iter() {
            let similarity = simhash_similarity(simhash, *entry.value());
            if similarity >= min_similarity
                && best.as_ref().map(|(_, s)| similarity > *s).unwrap_or(true)
            {
                best = Some((entry.key().clone(), similarity));
            }
        }
        best
    }

    /// Reload the index from the document collection.
    pub async fn rebuild(&self, store: &dyn VectorStore) -> Result<(), StoreError> {
        self.hashes.clear();
        for record in store.scan(DOCUMENTS).await? {
            if let Some(simhash) = record
                .metadata
                .get("simhash")
                .and_then(|v| v.as_str())
                .and_then(|s| u64::from_str_radix(s, 16).ok())
            {
                self.hashes.insert(record.id, simhash);
            }
        }
        Ok(())
    }
}

/// The triage stage.
pub struct Triage {
    store: Arc<dyn VectorStore>,
    fuzzy: Arc<FuzzyIndex>,
    fuzzy_threshold: f64,
}

impl Triage {
    pub fn new(store: Arc<dyn VectorStore>, fuzzy: Arc<FuzzyIndex>, fuzzy_threshold: f64) -> Self {
        Self {
            store,
            fuzzy,
            fuzzy_threshold,
        }
    }

    /// Compute the fingerprint and walk the decision ladder.
    ///
    /// Fail-open: internal errors produce CONTINUE / archival / 0.0 with
    /// reason `triage_error`.
    pub async fn decide(&self, doc: &ExtractedDocument) -> (Fingerprint, TriageDecision) {
        let fp = Fingerprint::compute(doc);
        match self.ladder(doc, &fp).await {
            Ok(decision) => {
                debug!(
                    category = decision.category.label(),
                    confidence = decision.confidence,
                    "triage decision"
                );
                (fp, decision)
            }
            Err(e) => {
                warn!(error = %e, "triage error, failing open");
                (
                    fp,
                    TriageDecision {
                        category: TriageCategory::Archival,
                        confidence: 0.0,
                        reasoning: "triage_error".to_string(),
                        action: TriageAction::Continue,
                        matched_doc_id: None,
                    },
                )
            }
        }
    }

    /// Decision ladder; first match wins.
    async fn ladder(
        &self,
        doc: &ExtractedDocument,
        fp: &Fingerprint,
    ) -> Result<TriageDecision, TriageError> {
        // 1. Exact content hash.
        if let Some(matched) = self.exact_match("content_sha", &fp.content_sha256).await? {
            return Ok(stop_duplicate(
                TriageCategory::Duplicate,
                1.0,
                "exact content hash match",
                matched,
            ));
        }

        // 2. Email message id.
        if let Some(message_id) = &fp.message_id {
            if let Some(matched) = self.exact_match("message_id", message_id).await? {
                return Ok(stop_duplicate(
                    TriageCategory::Duplicate,
                    1.0,
                    "email message-id match",
                    matched,
                ));
            }
        }

        // 2b. Chat transcripts: same opening turns, same conversation.
        if let Some(chat_head) = &fp.chat_head_sha {
            if let Some(matched) = self.exact_match("chat_head_sha", chat_head).await? {
                return Ok(stop_duplicate(
                    TriageCategory::Duplicate,
                    1.0,
                    "chat opening-turn match",
                    matched,
                ));
            }
        }

        // 3. Fuzzy near-duplicate.
        if let Some((matched, similarity)) = self.fuzzy.nearest(fp.simhash, self.fuzzy_threshold) {
            return Ok(stop_duplicate(
                TriageCategory::NearDuplicate,
                similarity,
                format!("simhash similarity {similarity:.3}"),
                matched,
            ));
        }

        // 4. Junk heuristics.
        if let Some(reason) = rules::junk_reason(doc) {
            return Ok(TriageDecision {
                category: TriageCategory::Junk,
                confidence: 0.9,
                reasoning: reason.to_string(),
                action: TriageAction::Stop,
                matched_doc_id: None,
            });
        }

        // 5. Actionable pattern rules.
        if let Some((kind, confidence)) = rules::actionable_match(doc) {
            return Ok(TriageDecision {
                category: kind.into(),
                confidence,
                reasoning: "pattern rule match".to_string(),
                action: TriageAction::Continue,
                matched_doc_id: None,
            });
        }

        // 6. Default.
        Ok(TriageDecision {
            category: TriageCategory::Archival,
            confidence: 0.5,
            reasoning: "no rule matched".to_string(),
            action: TriageAction::Continue,
            matched_doc_id: None,
        })
    }

    async fn exact_match(&self, field: &str, value: &str) -> Result<Option<String>, TriageError> {
        let ids = self
            .store
            .query_by_metadata(DOCUMENTS, &MetadataFilter::new().eq(field, value))
            .await?;
        Ok(ids.into_iter().next())
    }
}

fn stop_duplicate(
    category: TriageCategory,
    confidence: f64,
    reasoning: impl Into<String>,
    matched_doc_id: String,
) -> TriageDecision {
    TriageDecision {
        category,
        confidence,
        reasoning: reasoning.into(),
        action: TriageAction::Stop,
        matched_doc_id: Some(matched_doc_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DocumentType;
    use crate::store::{MemoryStore, Record};

    fn doc(text: &str) -> ExtractedDocument {
        ExtractedDocument {
            text: text.to_string(),
            doc_type: DocumentType::Text,
            ..Default::default()
        }
    }

    async fn triage_with(store: Arc<MemoryStore>) -> Triage {
        Triage::new(store, Arc::new(FuzzyIndex::new()), 0.92)
    }

    const PROSE: &str = "The Fedora installation guide covers writing an ISO image \
                         to a USB stick and verifying the checksum before booting.";

    #[tokio::test]
    async fn unseen_document_defaults_to_archival() {
        let triage = triage_with(Arc::new(MemoryStore::new())).await;
        let (_, decision) = triage.decide(&doc(PROSE)).await;
        assert_eq!(decision.category, TriageCategory::Archival);
        assert_eq!(decision.confidence, 0.5);
        assert_eq!(decision.action, TriageAction::Continue);
    }

    #[tokio::test]
    async fn committed_content_hash_stops_as_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let d = doc(PROSE);
        let fp = Fingerprint::compute(&d);
        store
            .upsert(
                DOCUMENTS,
                Record::new("doc-earlier").set("content_sha", fp.content_sha256.clone()),
            )
            .await
            .unwrap();

        let triage = triage_with(store).await;
        let (_, decision) = triage.decide(&d).await;
        assert_eq!(decision.category, TriageCategory::Duplicate);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.action, TriageAction::Stop);
        assert_eq!(decision.matched_doc_id.as_deref(), Some("doc-earlier"));
    }

    #[tokio::test]
    async fn near_duplicate_found_via_fuzzy_index() {
        let store = Arc::new(MemoryStore::new());
        let fuzzy = Arc::new(FuzzyIndex::new());
        let original = doc(PROSE);
        let original_fp = Fingerprint::compute(&original);
        fuzzy.insert("doc-earlier", original_fp.simhash);

        let near = doc(
            "The Fedora installation guide covers writing an ISO image \
             to a USB stick and verifying the checksum before starting.",
        );
        let triage = Triage::new(store, fuzzy, 0.92);
        let (_, decision) = triage.decide(&near).await;
        assert_eq!(decision.category, TriageCategory::NearDuplicate);
        assert!(decision.confidence >= 0.92);
        assert_eq!(decision.matched_doc_id.as_deref(), Some("doc-earlier"));
    }

    #[tokio::test]
    async fn junk_stops_without_llm_spend() {
        let triage = triage_with(Arc::new(MemoryStore::new())).await;
        let (_, decision) = triage.decide(&doc("ok")).await;
        assert_eq!(decision.category, TriageCategory::Junk);
        assert_eq!(decision.action, TriageAction::Stop);
    }

    #[tokio::test]
    async fn actionable_continues_with_pattern_confidence() {
        let triage = triage_with(Arc::new(MemoryStore::new())).await;
        let (_, decision) = triage
            .decide(&doc(
                "Invoice 2024-017: payment due by March 15. IBAN DE02 1234.",
            ))
            .await;
        assert_eq!(decision.category, TriageCategory::Financial);
        assert_eq!(decision.action, TriageAction::Continue);
        assert!(decision.confidence > 0.0);
    }
}
