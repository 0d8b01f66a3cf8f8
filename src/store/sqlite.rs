//! SQLite store backend.
//!
//! One database file holds every collection in a single `records` table.
//! Vectors are stored as little-endian f32 BLOBs; metadata as JSON text
//! queried through `json_extract`. WAL mode keeps reads concurrent with
//! the per-document write transactions.

use super::{Metadata, MetadataFilter, MetadataValue, Record, StoreError, StoreResult, VectorStore};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed vector store. Thread-safe via an internal connection mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database, mainly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                vector BLOB,
                metadata_json TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection
                ON records(collection);

            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn row_to_record(
    id: String,
    vector: Option<Vec<u8>>,
    metadata_json: String,
) -> StoreResult<Record> {
    let metadata: Metadata = serde_json::from_str(&metadata_json)?;
    Ok(Record {
        id,
        vector: vector.map(|bytes| decode_vector(&bytes)),
        metadata,
    })
}

fn sql_value(value: &MetadataValue) -> rusqlite::types::Value {
    match value {
        MetadataValue::Str(s) => rusqlite::types::Value::Text(s.clone()),
        MetadataValue::Int(i) => rusqlite::types::Value::Integer(*i),
        MetadataValue::Float(f) => rusqlite::types::Value::Real(*f),
        // json_extract surfaces JSON booleans as 0/1.
        MetadataValue::Bool(b) => rusqlite::types::Value::Integer(*b as i64),
    }
}

fn upsert_in(conn: &Connection, collection: &str, record: &Record) -> StoreResult<()> {
    let metadata_json = serde_json::to_string(&record.metadata)?;
    conn.execute(
        "INSERT INTO records (collection, id, vector, metadata_json)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(collection, id) DO UPDATE SET
             vector = excluded.vector,
             metadata_json = excluded.metadata_json",
        params![
            collection,
            record.id,
            record.vector.as_deref().map(encode_vector),
            metadata_json
        ],
    )?;
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, collection: &str, record: Record) -> StoreResult<()> {
        let conn = self.lock()?;
        upsert_in(&conn, collection, &record)
    }

    async fn query_by_metadata(
        &self,
        collection: &str,
        filter: &MetadataFilter,
    ) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;

        let mut sql = String::from("SELECT id FROM records WHERE collection = ?1");
        let mut bindings: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Text(collection.to_string())];
        for (field, value) in &filter.clauses {
            sql.push_str(" AND json_extract(metadata_json, ?) = ?");
            bindings.push(rusqlite::types::Value::Text(format!("$.{field}")));
            bindings.push(sql_value(value));
        }

        let mut statement = conn.prepare(&sql)?;
        let ids = statement
            .query_map(params_from_iter(bindings), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Record>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, vector, metadata_json FROM records
                 WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<Vec<u8>>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, vector, json)| row_to_record(id, vector, json))
            .transpose()
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(affected > 0)
    }

    async fn commit_document(&self, document: Record, chunks: Vec<Record>) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // Replace chunks from any previous ingest of this document.
        tx.execute(
            "DELETE FROM records
             WHERE collection = ?1
               AND json_extract(metadata_json, '$.doc_id') = ?2",
            params![super::CHUNKS, document.id],
        )?;
        for chunk in &chunks {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            tx.execute(
                "INSERT INTO records (collection, id, vector, metadata_json)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET
                     vector = excluded.vector,
                     metadata_json = excluded.metadata_json",
                params![
                    super::CHUNKS,
                    chunk.id,
                    chunk.vector.as_deref().map(encode_vector),
                    metadata_json
                ],
            )?;
        }
        let metadata_json = serde_json::to_string(&document.metadata)?;
        tx.execute(
            "INSERT INTO records (collection, id, vector, metadata_json)
             VALUES (?1, ?2, NULL, ?3)
             ON CONFLICT(collection, id) DO UPDATE SET
                 metadata_json = excluded.metadata_json",
            params![super::DOCUMENTS, document.id, metadata_json],
        )?;

        tx.commit()?;
        Ok(())
    }

    async fn scan(&self, collection: &str) -> StoreResult<Vec<Record>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT id, metadata_json FROM records WHERE collection = ?1 ORDER BY id",
        )?;
        let rows = statement
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, json)| row_to_record(id, None, json))
            .collect()
    }

    async fn count(&self, collection: &str) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
