//! Tables embedded in prose become exactly one standalone chunk carrying
//! the full table verbatim.

mod common;

use common::harness_with_draft;
use loam::extract::RawDocument;
use loam::store::{MetadataFilter, VectorStore, CHUNKS};

const DRAFT: &str = r#"{
    "title": "Kindergarten fee table for the year",
    "summary": "Monthly fees by income band.",
    "topics": ["education"],
    "technologies": [],
    "novelty": 0.9,
    "actionability": 0.8
}"#;

fn document_with_table() -> Vec<u8> {
    let mut text = String::from(
        "# Fees\n\nThe following table lists the monthly fee per income band \
         as agreed in the January meeting.\n\n",
    );
    text.push_str("| band | income | fee |\n|------|--------|-----|\n");
    for row in 1..=10 {
        text.push_str(&format!("| B{row} | {}k-{}k | {} EUR |\n", row * 10, row * 10 + 10, row * 25));
    }
    text.push_str("\nFees are due on the first of each month.\n");
    text.into_bytes()
}

#[tokio::test]
async fn table_is_one_chunk_with_all_rows() {
    let harness = harness_with_draft(DRAFT).await;

    let result = harness
        .service
        .ingest(RawDocument::new(document_with_table(), "fees.md"))
        .await;
    let doc_id = result.doc_id.unwrap();

    let ids = harness
        .store
        .query_by_metadata(
            CHUNKS,
            &MetadataFilter::new()
                .eq("doc_id", doc_id.as_str())
                .eq("chunk_type", "table"),
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 1, "expected exactly one table chunk");

    let table = harness.store.get(CHUNKS, &ids[0]).await.unwrap().unwrap();
    let text = table.str_field("text").unwrap();
    for row in 1..=10 {
        assert!(text.contains(&format!("| B{row} |")), "missing row B{row}");
    }

    // Prose before and after the table lives in other chunks.
    let all = harness
        .store
        .query_by_metadata(CHUNKS, &MetadataFilter::new().eq("doc_id", doc_id.as_str()))
        .await
        .unwrap();
    assert!(all.len() > 1);
}

#[tokio::test]
async fn table_chunk_keeps_its_section_anchor() {
    let harness = harness_with_draft(DRAFT).await;

    let result = harness
        .service
        .ingest(RawDocument::new(document_with_table(), "fees.md"))
        .await;
    let doc_id = result.doc_id.unwrap();

    let ids = harness
        .store
        .query_by_metadata(
            CHUNKS,
            &MetadataFilter::new()
                .eq("doc_id", doc_id.as_str())
                .eq("chunk_type", "table"),
        )
        .await
        .unwrap();
    let table = harness.store.get(CHUNKS, &ids[0]).await.unwrap().unwrap();
    assert_eq!(table.str_field("section_title"), Some("Fees"));
}
