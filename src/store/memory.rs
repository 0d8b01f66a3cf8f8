//! In-memory store backend for tests and vector-store-less deployments.

use super::{Metadata, MetadataFilter, Record, StoreResult, VectorStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// DashMap-backed store. Outer key: collection, inner key: record id.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, BTreeMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, collection: &str, record: Record) -> StoreResult<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn query_by_metadata(
        &self,
        collection: &str,
        filter: &MetadataFilter,
    ) -> StoreResult<Vec<String>> {
        Ok(self
            .collections
            .get(collection)
            .map(|records| {
                records
                    .values()
                    .filter(|r| filter.matches(&r.metadata))
                    .map(|r| r.id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Record>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|records| records.get(id).cloned()))
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        Ok(self
            .collections
            .get_mut(collection)
            .map(|mut records| records.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn commit_document(&self, document: Record, chunks: Vec<Record>) -> StoreResult<()> {
        let doc_id = document.id.clone();

        // Replace any chunks from a previous ingest of this document.
        {
            let mut chunk_map = self
                .collections
                .entry(super::CHUNKS.to_string())
                .or_default();
            chunk_map.retain(|_, r| r.str_field("doc_id") != Some(doc_id.as_str()));
            for chunk in chunks {
                chunk_map.insert(chunk.id.clone(), chunk);
            }
        }
        self.upsert(super::DOCUMENTS, document).await
    }

    async fn scan(&self, collection: &str) -> StoreResult<Vec<Record>> {
        Ok(self
            .collections
            .get(collection)
            .map(|records| {
                records
                    .values()
                    .map(|r| Record {
                        id: r.id.clone(),
                        vector: None,
                        metadata: r.metadata.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str) -> StoreResult<usize> {
        Ok(self
            .collections
            .get(collection)
            .map(|records| records.len())
            .unwrap_or(0))
    }
}

/// Convenience used in tests: all metadata of a collection keyed by id.
impl MemoryStore {
    pub async fn dump(&self, collection: &str) -> Vec<(String, Metadata)> {
        self.collections
            .get(collection)
            .map(|records| {
                records
                    .values()
                    .map(|r| (r.id.clone(), r.metadata.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{MetadataFilter, CHUNKS, DOCUMENTS};
    use super::*;

    #[tokio::test]
    async fn upsert_get_delete_round_trip() {
        let store = MemoryStore::new();
        let record = Record::new("doc-1").set("doc_type", "markdown");
        store.upsert(DOCUMENTS, record.clone()).await.unwrap();

        assert_eq!(store.get(DOCUMENTS, "doc-1").await.unwrap(), Some(record));
        assert!(store.delete(DOCUMENTS, "doc-1").await.unwrap());
        assert!(!store.delete(DOCUMENTS, "doc-1").await.unwrap());
    }

    #[tokio::test]
    async fn commit_document_replaces_prior_chunks() {
        let store = MemoryStore::new();
        let doc = Record::new("doc-1");
        let old_chunks = vec![
            Record::new("doc-1#0").set("doc_id", "doc-1"),
            Record::new("doc-1#1").set("doc_id", "doc-1"),
        ];
        store.commit_document(doc.clone(), old_chunks).await.unwrap();
        assert_eq!(store.count(CHUNKS).await.unwrap(), 2);

        let new_chunks = vec![Record::new("doc-1#0").set("doc_id", "doc-1")];
        store.commit_document(doc, new_chunks).await.unwrap();
        assert_eq!(store.count(CHUNKS).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn metadata_query_filters_by_equality() {
        let store = MemoryStore::new();
        store
            .upsert(DOCUMENTS, Record::new("a").set("content_sha", "abc"))
            .await
            .unwrap();
        store
            .upsert(DOCUMENTS, Record::new("b").set("content_sha", "def"))
            .await
            .unwrap();

        let hits = store
            .query_by_metadata(DOCUMENTS, &MetadataFilter::new().eq("content_sha", "abc"))
            .await
            .unwrap();
        assert_eq!(hits, vec!["a".to_string()]);
    }
}
