//! Shared builders for the integration suites.

use loam::api::IngestService;
use loam::config::PipelineConfig;
use loam::embed::HashEmbedder;
use loam::enrich::{Vocabulary, VocabularyService};
use loam::llm::{FallbackChain, MockLlm};
use loam::store::MemoryStore;
use std::sync::Arc;
use tempfile::TempDir;

/// Vocabulary used across suites: topics, a watchlisted project, and the
/// Fedora/QEMU concept table.
pub const VOCAB_YAML: &str = r#"
topics: [education, linux, infrastructure]
places: [Berlin]
projects:
  - id: project/home-lab
    label: Home Lab
    watchlist: [qemu, proxmox]
concepts:
  - id: vocab:Fedora
    pref_label: Fedora
    alt_labels: [fedora linux]
    kind: software
    broader: [vocab:Linux]
  - id: vocab:QEMU
    pref_label: QEMU
    kind: software
people_roles: [teacher]
"#;

/// A draft that passes the gate comfortably.
pub const DEFAULT_DRAFT: &str = r#"{
    "title": "A useful document about the home lab",
    "summary": "Covers lab hardware and software in detail.",
    "topics": ["linux"],
    "projects": [],
    "places": [],
    "people": [],
    "organizations": [],
    "technologies": ["Fedora"],
    "events": [],
    "concepts": [],
    "dates": [],
    "novelty": 0.9,
    "actionability": 0.8
}"#;

pub struct TestHarness {
    pub service: IngestService,
    pub store: Arc<MemoryStore>,
    pub llm: Arc<MockLlm>,
    pub vault: TempDir,
}

impl TestHarness {
    pub fn vault_path(&self) -> &std::path::Path {
        self.vault.path()
    }
}

/// Build a service whose LLM always answers with `draft` and whose store,
/// embedder, and vault are test-local.
pub async fn harness_with_draft(draft: &str) -> TestHarness {
    harness_with(PipelineConfig::default(), draft).await
}

fn init_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .try_init();
    });
}

pub async fn harness_with(config: PipelineConfig, draft: &str) -> TestHarness {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(MockLlm::new("mock").with_fallback(draft));
    let mut chain = FallbackChain::new(config.llm_timeout_s);
    chain.push(llm.clone(), "mock-model", 4);

    let vault = TempDir::new().expect("vault tempdir");
    let service = IngestService::start(
        config,
        store.clone(),
        Arc::new(HashEmbedder::new(64)),
        Arc::new(chain),
        Arc::new(VocabularyService::new(
            Vocabulary::from_yaml(VOCAB_YAML).expect("test vocabulary"),
        )),
        vault.path(),
    )
    .await
    .expect("service start");

    TestHarness {
        service,
        store,
        llm,
        vault,
    }
}

/// The single exported note (non-refs markdown file) of the vault.
pub fn exported_notes(vault: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut notes = Vec::new();
    for entry in walkdir::WalkDir::new(vault).min_depth(1).max_depth(1) {
        let entry = entry.expect("vault entry");
        if entry.file_type().is_file()
            && entry.path().extension().map(|e| e == "md").unwrap_or(false)
        {
            notes.push(entry.path().to_path_buf());
        }
    }
    notes.sort();
    notes
}
