//! Ingestion results: the structured outcome of one document.

use crate::extract::RawDocument;
use crate::llm::CostRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal status of an ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// Stored (or recognized as a duplicate of a stored twin).
    Stored,
    /// Vector write committed, markdown export failed and was queued.
    StoredUnexported,
    Failed,
    Cancelled,
    Timeout,
}

impl IngestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            IngestStatus::Stored => "stored",
            IngestStatus::StoredUnexported => "stored_unexported",
            IngestStatus::Failed => "failed",
            IngestStatus::Cancelled => "cancelled",
            IngestStatus::Timeout => "timeout",
        }
    }
}

/// What the pipeline did with the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestAction {
    Unique,
    Duplicate,
    NearDuplicate,
}

/// Error kind labels mirrored into metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Extraction,
    Triage,
    Llm,
    Validation,
    Storage,
    Export,
    Budget,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Extraction => "extraction",
            ErrorKind::Triage => "triage",
            ErrorKind::Llm => "llm",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
            ErrorKind::Export => "export",
            ErrorKind::Budget => "budget",
        }
    }
}

/// Cost summary across all LLM calls for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSummary {
    pub calls: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub usd: f64,
}

impl CostSummary {
    pub fn from_records(records: &[CostRecord]) -> Self {
        Self {
            calls: records.len(),
            tokens_in: records.iter().map(|c| c.tokens_in).sum(),
            tokens_out: records.iter().map(|c| c.tokens_out).sum(),
            usd: records.iter().map(|c| c.usd).sum(),
        }
    }
}

/// Structured per-document outcome. Failures carry stage and kind, never
/// a stack trace.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResult {
    pub doc_id: Option<String>,
    pub status: IngestStatus,
    pub action: IngestAction,
    pub matched_doc_id: Option<String>,
    /// Whether the document was embedded (quality gate verdict).
    pub do_index: bool,
    /// Failing stage for failed/cancelled documents.
    pub stage: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    /// Number of chunks committed to the store.
    pub chunks: usize,
    /// Vault-relative note path, when exported.
    pub export_path: Option<PathBuf>,
    pub cost: CostSummary,
    /// Email attachments discovered during extraction, for the caller to
    /// enqueue as follow-up ingestions.
    #[serde(skip)]
    pub pending_attachments: Vec<RawDocument>,
}

impl IngestResult {
    pub fn failed(stage: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            doc_id: None,
            status: IngestStatus::Failed,
            action: IngestAction::Unique,
            matched_doc_id: None,
            do_index: false,
            stage: Some(stage.to_string()),
            error_kind: Some(kind),
            message: Some(message.into()),
            chunks: 0,
            export_path: None,
            cost: CostSummary::default(),
            pending_attachments: Vec::new(),
        }
    }

    pub fn stored(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: Some(doc_id.into()),
            status: IngestStatus::Stored,
            action: IngestAction::Unique,
            matched_doc_id: None,
            do_index: true,
            stage: None,
            error_kind: None,
            message: None,
            chunks: 0,
            export_path: None,
            cost: CostSummary::default(),
            pending_attachments: Vec::new(),
        }
    }
}
