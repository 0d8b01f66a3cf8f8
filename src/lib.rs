//! Loam: staged document ingestion and enrichment engine.
//!
//! Turns heterogeneous documents (PDF, email, office, markdown, images,
//! chat exports) into vector-indexed chunks with structured metadata and
//! a linked markdown vault with entity stub pages.
//!
//! # Pipeline
//!
//! Six gated stages per document, strictly ordered:
//!
//! ```text
//! Raw bytes ─▶ Extract ─▶ Triage ─▶ Enrich ─▶ Quality Gate ─▶ Chunk ─▶ Store+Export
//! ```
//!
//! Triage fails open (a triage bug never loses documents), enrichment
//! fails closed (no vectors without metadata), export fails open (the
//! vector store is the store of record).
//!
//! # Example
//!
//! ```no_run
//! use loam::api::IngestService;
//! use loam::config::PipelineConfig;
//! use loam::embed::HashEmbedder;
//! use loam::enrich::VocabularyService;
//! use loam::extract::RawDocument;
//! use loam::llm::FallbackChain;
//! use loam::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let service = IngestService::start(
//!     PipelineConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(HashEmbedder::new(384)),
//!     Arc::new(FallbackChain::new(30)),
//!     Arc::new(VocabularyService::empty()),
//!     "./vault",
//! )
//! .await?;
//!
//! let result = service
//!     .ingest(RawDocument::new(b"# Note\n\nHello.".to_vec(), "note.md"))
//!     .await;
//! println!("{:?}", result.status);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod chunk;
pub mod config;
pub mod embed;
pub mod enrich;
pub mod export;
pub mod extract;
pub mod gate;
pub mod llm;
pub mod pipeline;
pub mod store;
pub mod tokens;
pub mod triage;

pub use api::{IngestService, ServiceStats};
pub use chunk::{Chunk, ChunkType, Chunker};
pub use config::{AutoLinkMode, PipelineConfig, ProviderSlot};
pub use embed::{Embedder, EmbeddingError, HashEmbedder};
pub use enrich::{
    EnrichedMetadata, Enricher, EntityKind, EntityRef, QualityScores, Vocabulary,
    VocabularyConcept, VocabularyService,
};
pub use export::VaultExporter;
pub use extract::{
    DocumentType, ExtractedDocument, ExtractionError, Extractor, RawDocument, Section,
    SectionKind,
};
pub use gate::{GateDecision, GateReason};
pub use llm::{ChatCompletionsClient, CostRecord, FallbackChain, LlmClient, LlmError, MockLlm};
pub use pipeline::{
    CancellationToken, CostSummary, IngestAction, IngestResult, IngestStatus, Pipeline, Stats,
};
pub use store::{MemoryStore, MetadataFilter, Record, SqliteStore, StoreError, VectorStore};
pub use triage::{Fingerprint, FuzzyIndex, Triage, TriageCategory, TriageDecision};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
