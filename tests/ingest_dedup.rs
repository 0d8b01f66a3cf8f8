//! Duplicate detection end to end: byte-identical re-ingestion is a no-op
//! at the store, near-duplicates stop via the fuzzy index, and the stable
//! doc id survives retries.

mod common;

use common::{harness_with_draft, DEFAULT_DRAFT};
use loam::extract::RawDocument;
use loam::pipeline::{IngestAction, IngestStatus};
use loam::store::{VectorStore, CHUNKS};

const KITA: &[u8] = b"Kita schedule: Mon 08:00, Wed 08:00";

#[tokio::test]
async fn second_ingest_of_same_bytes_is_reported_duplicate() {
    let harness = harness_with_draft(DEFAULT_DRAFT).await;

    let first = harness
        .service
        .ingest(RawDocument::new(KITA.to_vec(), "kita.txt"))
        .await;
    assert_eq!(first.status, IngestStatus::Stored);
    assert_eq!(first.action, IngestAction::Unique);
    assert_eq!(first.chunks, 1);
    let first_id = first.doc_id.clone().unwrap();

    let second = harness
        .service
        .ingest(RawDocument::new(KITA.to_vec(), "kita-copy.txt"))
        .await;
    assert_eq!(second.status, IngestStatus::Stored);
    assert_eq!(second.action, IngestAction::Duplicate);
    assert_eq!(second.matched_doc_id.as_deref(), Some(first_id.as_str()));

    // Exactly one stored chunk: the duplicate committed nothing.
    assert_eq!(harness.store.count(CHUNKS).await.unwrap(), 1);
}

#[tokio::test]
async fn duplicates_never_spend_llm_budget() {
    let harness = harness_with_draft(DEFAULT_DRAFT).await;

    harness
        .service
        .ingest(RawDocument::new(KITA.to_vec(), "kita.txt"))
        .await;
    let calls_after_first = harness.llm.call_count();

    harness
        .service
        .ingest(RawDocument::new(KITA.to_vec(), "kita.txt"))
        .await;
    assert_eq!(harness.llm.call_count(), calls_after_first);
}

#[tokio::test]
async fn near_duplicate_stops_with_similarity_confidence() {
    let harness = harness_with_draft(DEFAULT_DRAFT).await;

    // A long document with a small trailing addition: near-duplicate by
    // construction. Proportionally large edits are different documents.
    let base = "The Fedora installation guide covers writing an ISO image to a USB \
                stick using the media writer tool on linux and macos including \
                checksum verification and troubleshooting boot issues in detail. "
        .repeat(12);
    let near = format!("{base} One appended clarification sentence.");

    let first = harness
        .service
        .ingest(RawDocument::new(base.as_bytes().to_vec(), "guide.txt"))
        .await;
    assert_eq!(first.action, IngestAction::Unique);

    let second = harness
        .service
        .ingest(RawDocument::new(near.as_bytes().to_vec(), "guide-v2.txt"))
        .await;
    assert_eq!(second.action, IngestAction::NearDuplicate);
    assert_eq!(second.matched_doc_id, first.doc_id);
}

#[tokio::test]
async fn doc_id_is_stable_for_identical_content() {
    let harness = harness_with_draft(DEFAULT_DRAFT).await;

    let first = harness
        .service
        .ingest(RawDocument::new(KITA.to_vec(), "a.txt"))
        .await;
    let second = harness
        .service
        .ingest(RawDocument::new(KITA.to_vec(), "b.txt"))
        .await;
    // Same content hash, same id, regardless of filename or ordering.
    assert_eq!(first.doc_id, second.doc_id);
}

#[tokio::test]
async fn unrelated_documents_both_store() {
    let harness = harness_with_draft(DEFAULT_DRAFT).await;

    let first = harness
        .service
        .ingest(RawDocument::new(KITA.to_vec(), "kita.txt"))
        .await;
    let second = harness
        .service
        .ingest(RawDocument::new(
            b"Quarterly report: revenue grew four percent while operating costs declined."
                .to_vec(),
            "report.txt",
        ))
        .await;

    assert_eq!(first.action, IngestAction::Unique);
    assert_eq!(second.action, IngestAction::Unique);
    assert_ne!(first.doc_id, second.doc_id);
}
