//! Vector store abstraction.
//!
//! Two collections back the pipeline: `documents` holds one metadata record
//! per ingested document (fingerprints included, no vector), `chunks` holds
//! embedded chunk records. Metadata is flattened to primitive values; list
//! fields are comma-joined strings so any scalar-only store can hold them.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::collections::BTreeMap;

/// Document metadata collection name.
pub const DOCUMENTS: &str = "documents";
/// Chunk collection name.
pub const CHUNKS: &str = "chunks";

/// Errors from store operations. Fatal for the document being processed;
/// never fatal for sibling documents.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A primitive metadata value. Stores that only accept scalars get exactly
/// these four shapes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Comma-join a list into the scalar form stores require.
    pub fn joined(values: &[String]) -> Self {
        MetadataValue::Str(values.join(","))
    }
}

/// Flat metadata map.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// One stored record: id, optional vector, flat metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub vector: Option<Vec<f32>>,
    pub metadata: Metadata,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vector: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetadataValue::as_str)
    }
}

/// Equality filter over scalar metadata fields. All clauses must match.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub clauses: Vec<(String, MetadataValue)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| metadata.get(field) == Some(value))
    }
}

/// Vector store contract consumed by the pipeline.
///
/// Implementations must be thread-safe; the pipeline shares one instance
/// across workers.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite a record by id.
    async fn upsert(&self, collection: &str, record: Record) -> StoreResult<()>;

    /// Ids of records whose metadata matches every filter clause.
    async fn query_by_metadata(
        &self,
        collection: &str,
        filter: &MetadataFilter,
    ) -> StoreResult<Vec<String>>;

    /// Fetch one record.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Record>>;

    /// Delete one record. Returns whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool>;

    /// Commit a document record and its chunk batch atomically.
    ///
    /// Either the document and every chunk land, or nothing does. Existing
    /// chunks for the same document are replaced (force re-ingest path).
    async fn commit_document(&self, document: Record, chunks: Vec<Record>) -> StoreResult<()>;

    /// All records of a collection, vectors omitted. Used to rebuild the
    /// in-memory fuzzy fingerprint index at startup.
    async fn scan(&self, collection: &str) -> StoreResult<Vec<Record>>;

    /// Number of records in a collection.
    async fn count(&self, collection: &str) -> StoreResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_all_clauses() {
        let mut metadata = Metadata::new();
        metadata.insert("doc_type".into(), "email".into());
        metadata.insert("gated".into(), false.into());

        assert!(MetadataFilter::new()
            .eq("doc_type", "email")
            .matches(&metadata));
        assert!(!MetadataFilter::new()
            .eq("doc_type", "email")
            .eq("gated", true)
            .matches(&metadata));
    }

    #[test]
    fn joined_lists_are_comma_separated() {
        let joined = MetadataValue::joined(&["a".into(), "b".into()]);
        assert_eq!(joined, MetadataValue::Str("a,b".into()));
    }
}
