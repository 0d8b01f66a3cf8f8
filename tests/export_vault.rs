//! Vault invariants: stubs, wiki-links, daily notes, ignore blocks, and
//! re-ingestion idempotence.

mod common;

use common::{exported_notes, harness_with_draft};
use loam::chunk::{IGNORE_END, IGNORE_START};
use loam::extract::RawDocument;
use loam::store::{MetadataFilter, VectorStore, CHUNKS};

const DRAFT: &str = r#"{
    "title": "Fedora kiosk maintenance log for January",
    "summary": "Maintenance notes for the kiosk machine.",
    "topics": ["linux"],
    "projects": [],
    "places": ["Berlin"],
    "people": ["Anna Schmidt"],
    "organizations": [],
    "technologies": ["Fedora"],
    "events": [],
    "concepts": [],
    "dates": [],
    "novelty": 0.9,
    "actionability": 0.8
}"#;

const DOC: &[u8] = b"# Kiosk log\n\nAnna Schmidt reinstalled Fedora on the kiosk in Berlin \
after the display froze during the morning run.\n";

#[tokio::test]
async fn entity_stubs_exist_and_notes_link_them() {
    let harness = harness_with_draft(DRAFT).await;

    let result = harness
        .service
        .ingest(RawDocument::new(DOC.to_vec(), "kiosk.md"))
        .await;
    let note = std::fs::read_to_string(
        harness.vault_path().join(result.export_path.unwrap()),
    )
    .unwrap();

    // Stub pages exist with type and name set.
    let person_stub = std::fs::read_to_string(
        harness.vault_path().join("refs/persons/anna-schmidt.md"),
    )
    .unwrap();
    assert!(person_stub.contains("type: person"));
    assert!(person_stub.contains("name: \"Anna Schmidt\""));

    let tech_stub = std::fs::read_to_string(
        harness.vault_path().join("refs/technologies/fedora.md"),
    )
    .unwrap();
    assert!(tech_stub.contains("type: technology"));

    // The note wiki-links both entities (content or xref).
    assert!(note.contains("[[refs/persons/anna-schmidt|"));
    assert!(note.contains("[[refs/technologies/fedora|"));
}

#[tokio::test]
async fn first_occurrence_is_linked_in_content() {
    let harness = harness_with_draft(DRAFT).await;

    let result = harness
        .service
        .ingest(RawDocument::new(DOC.to_vec(), "kiosk.md"))
        .await;
    let note = std::fs::read_to_string(
        harness.vault_path().join(result.export_path.unwrap()),
    )
    .unwrap();

    let content_start = note.find("## Content").unwrap();
    let content_end = note.find("## Related Notes").unwrap();
    let content = &note[content_start..content_end];
    assert!(content.contains("[[refs/persons/anna-schmidt|Anna Schmidt]]"));
    assert!(content.contains("[[refs/technologies/fedora|Fedora]]"));
}

#[tokio::test]
async fn reingest_changes_no_stub_and_no_daily_membership() {
    let harness = harness_with_draft(DRAFT).await;

    harness
        .service
        .ingest(RawDocument::new(DOC.to_vec(), "kiosk.md"))
        .await;

    let stub_path = harness.vault_path().join("refs/persons/anna-schmidt.md");
    let stub_before = std::fs::read_to_string(&stub_path).unwrap();
    let chunks_before = harness.store.count(CHUNKS).await.unwrap();

    // Byte-identical re-ingestion.
    harness
        .service
        .ingest(RawDocument::new(DOC.to_vec(), "kiosk.md"))
        .await;

    assert_eq!(std::fs::read_to_string(&stub_path).unwrap(), stub_before);
    assert_eq!(harness.store.count(CHUNKS).await.unwrap(), chunks_before);
    assert_eq!(exported_notes(harness.vault_path()).len(), 1);
}

#[tokio::test]
async fn forced_reingest_overwrites_by_chunk_id() {
    let harness = harness_with_draft(DRAFT).await;

    let first = harness
        .service
        .ingest(RawDocument::new(DOC.to_vec(), "kiosk.md"))
        .await;
    let doc_id = first.doc_id.unwrap();
    let chunks_before = harness.store.count(CHUNKS).await.unwrap();

    let reingested = harness.service.reingest(&doc_id).await;
    assert_eq!(reingested.status, loam::pipeline::IngestStatus::Stored);
    assert_eq!(reingested.doc_id.as_deref(), Some(doc_id.as_str()));
    assert_eq!(harness.store.count(CHUNKS).await.unwrap(), chunks_before);
}

#[tokio::test]
async fn ignore_blocks_render_but_never_embed() {
    let harness = harness_with_draft(DRAFT).await;

    let text = format!(
        "# Kiosk log\n\nVisible maintenance note about the Fedora kiosk machine.\n\n\
         {IGNORE_START}\n\nprivate remark that must not be embedded\n\n{IGNORE_END}\n\n\
         Another visible line about Berlin.\n"
    );
    let result = harness
        .service
        .ingest(RawDocument::new(text.into_bytes(), "kiosk.md"))
        .await;
    let doc_id = result.doc_id.unwrap();

    // Rendered note keeps the ignore block content.
    let note = std::fs::read_to_string(
        harness.vault_path().join(result.export_path.unwrap()),
    )
    .unwrap();
    assert!(note.contains("private remark"));

    // No chunk contains it.
    let ids = harness
        .store
        .query_by_metadata(CHUNKS, &MetadataFilter::new().eq("doc_id", doc_id.as_str()))
        .await
        .unwrap();
    assert!(!ids.is_empty());
    for id in ids {
        let chunk = harness.store.get(CHUNKS, &id).await.unwrap().unwrap();
        assert!(!chunk.str_field("text").unwrap().contains("private remark"));
    }
}

#[tokio::test]
async fn concurrent_same_day_documents_keep_all_daily_links() {
    let harness = harness_with_draft(DRAFT).await;

    // Two different documents finishing close together on the same day.
    let a = RawDocument::new(
        b"# Morning\n\nAnna Schmidt checked the Fedora kiosk before opening."
            .to_vec(),
        "morning.md",
    );
    let b = RawDocument::new(
        b"# Evening\n\nThe kiosk ran a full Fedora update after closing time."
            .to_vec(),
        "evening.md",
    );
    let results = harness.service.batch_ingest(vec![a, b]).await;
    assert!(results.iter().all(|r| r.export_path.is_some()));

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let daily = std::fs::read_to_string(
        harness.vault_path().join(format!("refs/days/{today}.md")),
    )
    .unwrap();
    for result in &results {
        let stem = result
            .export_path
            .as_ref()
            .unwrap()
            .file_stem()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert_eq!(daily.matches(&stem).count(), 1, "daily note:\n{daily}");
    }
}
