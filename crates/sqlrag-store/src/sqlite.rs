//! SQLite-based vector index implementation.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use sqlrag_core::{
    EmbeddingRecord, IndexHit, IndexStats, RecordMetadata, Result, SchemaDocument, SqlRagError,
    VectorIndex,
};

use crate::schema::{SCHEMA, SCHEMA_VERSION};

/// SQLite-backed vector index.
///
/// Holds no open handle: every operation opens the file, runs, and closes
/// the connection again, so no connection state is shared between calls.
#[derive(Debug, Clone)]
pub struct SqliteVectorIndex {
    /// Index file path.
    path: PathBuf,

    /// Collection this index reads and writes.
    collection: String,
}

/// Raw record columns, decoded outside the rusqlite row callback.
struct StoredRow {
    id: String,
    embedding: Vec<u8>,
    document: String,
    metadata: String,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            embedding: row.get(1)?,
            document: row.get(2)?,
            metadata: row.get(3)?,
        })
    }

    fn into_record(self) -> Result<EmbeddingRecord> {
        let metadata: RecordMetadata = serde_json::from_str(&self.metadata)?;
        Ok(EmbeddingRecord {
            id: self.id,
            vector: bytes_to_vec(&self.embedding)?,
            document: SchemaDocument::from_text(self.document),
            metadata,
        })
    }
}

impl SqliteVectorIndex {
    /// Create an index handle for `collection` in the file at `path`.
    ///
    /// Nothing is opened until the first operation.
    pub fn new(path: impl Into<PathBuf>, collection: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            collection: collection.into(),
        }
    }

    /// Index file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Open a fresh connection and make sure the schema exists.
    fn open(&self) -> Result<Connection> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SqlRagError::vector_index(format!("Failed to open index: {}", e)))?;

        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| SqlRagError::vector_index(format!("Failed to initialize schema: {}", e)))?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

        Ok(conn)
    }

    /// Configure the connection.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| SqlRagError::vector_index(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Run `f` on a connection opened for this call only.
    ///
    /// rusqlite blocks; `f` runs inline on the calling task, not on a
    /// blocking pool.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut conn = self.open()?;
        let result = f(&mut conn);

        if let Err((_, e)) = conn.close() {
            warn!("Failed to close index connection: {}", e);
        }

        result
    }

    fn collection_exists(conn: &Connection, name: &str) -> Result<bool> {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

        Ok(found.is_some())
    }

    fn require_collection(conn: &Connection, name: &str) -> Result<()> {
        if Self::collection_exists(conn, name)? {
            Ok(())
        } else {
            Err(SqlRagError::CollectionNotFound {
                name: name.to_string(),
            })
        }
    }

    fn load_rows(conn: &Connection, collection: &str) -> Result<Vec<StoredRow>> {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, embedding, document, metadata
                FROM records
                WHERE collection = ?1
                ORDER BY id
                "#,
            )
            .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

        let rows = stmt
            .query_map(params![collection], StoredRow::from_row)
            .map_err(|e| SqlRagError::vector_index(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

        Ok(rows)
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn ensure_collection(&self) -> Result<()> {
        let name = self.collection.clone();
        self.with_conn(|conn| {
            let created = conn
                .execute(
                    "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
                    params![name, now_millis()],
                )
                .map_err(|e| SqlRagError::vector_index(format!("Failed to create collection: {}", e)))?;

            if created > 0 {
                info!("Created collection: {}", name);
            }
            Ok(())
        })
    }

    async fn drop_collection(&self) -> Result<()> {
        let name = self.collection.clone();
        self.with_conn(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

            Self::require_collection(&tx, &name)?;

            let records = tx
                .execute("DELETE FROM records WHERE collection = ?1", params![name])
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

            tx.execute("DELETE FROM collections WHERE name = ?1", params![name])
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

            tx.commit()
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

            info!("Dropped collection {} ({} records)", name, records);
            Ok(())
        })
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<()> {
        if record.vector.is_empty() {
            return Err(SqlRagError::invalid_argument(format!(
                "Empty embedding for record {}",
                record.id
            )));
        }

        let name = self.collection.clone();
        let metadata = serde_json::to_string(&record.metadata)?;
        let content_hash = blake3::hash(record.document.as_str().as_bytes());

        self.with_conn(|conn| {
            Self::require_collection(conn, &name)?;

            conn.execute(
                r#"
                INSERT INTO records (collection, id, embedding, dimension, document,
                                     metadata, content_hash, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(collection, id) DO UPDATE SET
                    embedding = excluded.embedding,
                    dimension = excluded.dimension,
                    document = excluded.document,
                    metadata = excluded.metadata,
                    content_hash = excluded.content_hash,
                    updated_at = excluded.updated_at
                "#,
                params![
                    name,
                    record.id,
                    vec_to_bytes(&record.vector),
                    record.vector.len() as i64,
                    record.document.as_str(),
                    metadata,
                    content_hash.as_bytes().as_slice(),
                    now_millis(),
                ],
            )
            .map_err(|e| SqlRagError::vector_index(format!("Failed to upsert record: {}", e)))?;

            debug!("Upserted record: {}", record.id);
            Ok(())
        })
    }

    async fn query(&self, vector: &[f32], top_n: usize) -> Result<Vec<IndexHit>> {
        let name = self.collection.clone();
        let rows = self.with_conn(|conn| {
            Self::require_collection(conn, &name)?;
            Self::load_rows(conn, &name)
        })?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row.into_record()?;
            let Some(score) = cosine_similarity(vector, &record.vector) else {
                warn!(
                    "Skipping record {}: dimension {} does not match query dimension {}",
                    record.id,
                    record.vector.len(),
                    vector.len()
                );
                continue;
            };

            hits.push(IndexHit {
                id: record.id,
                document: record.document,
                metadata: record.metadata,
                score,
            });
        }

        // Sort by similarity, most similar first
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_n);

        debug!("Vector query returned {} hits", hits.len());
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<EmbeddingRecord>> {
        let name = self.collection.clone();
        let id = id.to_string();
        let row = self.with_conn(|conn| {
            Self::require_collection(conn, &name)?;

            conn.query_row(
                r#"
                SELECT id, embedding, document, metadata
                FROM records
                WHERE collection = ?1 AND id = ?2
                "#,
                params![name, id],
                StoredRow::from_row,
            )
            .optional()
            .map_err(|e| SqlRagError::vector_index(e.to_string()))
        })?;

        row.map(StoredRow::into_record).transpose()
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let name = self.collection.clone();
        self.with_conn(|conn| {
            Self::require_collection(conn, &name)?;

            let mut stmt = conn
                .prepare("SELECT id FROM records WHERE collection = ?1 ORDER BY id")
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

            let ids = stmt
                .query_map(params![name], |row| row.get(0))
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?
                .collect::<std::result::Result<Vec<String>, _>>()
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

            Ok(ids)
        })
    }

    async fn stats(&self) -> Result<IndexStats> {
        let name = self.collection.clone();
        self.with_conn(|conn| {
            Self::require_collection(conn, &name)?;

            let mut stmt = conn
                .prepare("SELECT id, document, dimension FROM records WHERE collection = ?1")
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

            let rows = stmt
                .query_map(params![name], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| SqlRagError::vector_index(e.to_string()))?;

            let dimension = rows.first().map(|(_, _, dim)| *dim as usize);
            let entries: Vec<(String, String)> = rows
                .into_iter()
                .map(|(id, document, _)| (id, document))
                .collect();

            let page_count: u64 = conn
                .query_row("PRAGMA page_count", [], |row| row.get(0))
                .map_err(|e| SqlRagError::vector_index(format!("Failed to read page count: {}", e)))?;
            let page_size: u64 = conn
                .query_row("PRAGMA page_size", [], |row| row.get(0))
                .map_err(|e| SqlRagError::vector_index(format!("Failed to read page size: {}", e)))?;

            Ok(IndexStats {
                collection: name.clone(),
                records: entries.len() as u64,
                dimension,
                fingerprint: IndexStats::fingerprint_of(&entries),
                storage_bytes: page_count * page_size,
            })
        })
    }
}

/// Cosine similarity; None when the vectors cannot be compared.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x = f64::from(x);
        let y = f64::from(y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Some(0.0);
    }
    Some((dot / denom) as f32)
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert little-endian bytes back to an f32 vector.
fn bytes_to_vec(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(SqlRagError::vector_index(format!(
            "Corrupt embedding blob of {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlrag_core::{Column, ForeignKey, TableSchema};
    use tempfile::TempDir;

    fn index_in(dir: &TempDir) -> SqliteVectorIndex {
        SqliteVectorIndex::new(dir.path().join("index.sqlite"), "northwind_schema")
    }

    fn record(table: &str, vector: Vec<f32>) -> EmbeddingRecord {
        let schema = TableSchema::new(
            table,
            vec![Column::new("id", "int(11)", true, false)],
            vec![ForeignKey::new("id", "Other", "id")],
        );
        EmbeddingRecord::for_table(&schema, schema.render(), vector).unwrap()
    }

    #[tokio::test]
    async fn test_query_missing_collection() {
        let dir = TempDir::new().unwrap();
        let index = index_in(&dir);

        let err = index.query(&[1.0, 0.0], 5).await.unwrap_err();
        assert!(err.is_collection_not_found());
    }

    #[tokio::test]
    async fn test_drop_missing_collection() {
        let dir = TempDir::new().unwrap();
        let index = index_in(&dir);

        let err = index.drop_collection().await.unwrap_err();
        assert!(err.is_collection_not_found());
    }

    #[tokio::test]
    async fn test_upsert_requires_collection() {
        let dir = TempDir::new().unwrap();
        let index = index_in(&dir);

        let err = index.upsert(record("Orders", vec![1.0])).await.unwrap_err();
        assert!(err.is_collection_not_found());
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let index = index_in(&dir);
        index.ensure_collection().await.unwrap();

        let original = record("Orders", vec![0.25, -0.5, 1.0]);
        index.upsert(original.clone()).await.unwrap();

        let stored = index.get("Orders").await.unwrap().unwrap();
        assert_eq!(stored, original);
        assert_eq!(
            stored.metadata.table_schema().unwrap().table_name,
            "Orders"
        );
        assert!(index.get("Missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let dir = TempDir::new().unwrap();
        let index = index_in(&dir);
        index.ensure_collection().await.unwrap();

        index.upsert(record("Orders", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("Orders", vec![0.0, 1.0])).await.unwrap();

        assert_eq!(index.list_ids().await.unwrap(), vec!["Orders"]);
        let stored = index.get("Orders").await.unwrap().unwrap();
        assert_eq!(stored.vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let dir = TempDir::new().unwrap();
        let index = index_in(&dir);
        index.ensure_collection().await.unwrap();

        index.upsert(record("Orders", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("Customers", vec![0.7, 0.7])).await.unwrap();
        index.upsert(record("Shippers", vec![0.0, 1.0])).await.unwrap();

        let hits = index.query(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "Orders");
        assert_eq!(hits[1].id, "Customers");
        assert!(hits[0].score >= hits[1].score);

        // Fewer records than requested: return what exists
        let all = index.query(&[1.0, 0.1], 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_query_skips_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let index = index_in(&dir);
        index.ensure_collection().await.unwrap();

        index.upsert(record("Orders", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("Legacy", vec![1.0, 0.0, 0.0])).await.unwrap();

        let hits = index.query(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "Orders");
    }

    #[tokio::test]
    async fn test_drop_removes_records() {
        let dir = TempDir::new().unwrap();
        let index = index_in(&dir);
        index.ensure_collection().await.unwrap();
        index.upsert(record("Orders", vec![1.0])).await.unwrap();

        index.drop_collection().await.unwrap();
        index.ensure_collection().await.unwrap();

        assert!(index.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.sqlite");
        let a = SqliteVectorIndex::new(&path, "a");
        let b = SqliteVectorIndex::new(&path, "b");
        a.ensure_collection().await.unwrap();
        b.ensure_collection().await.unwrap();

        a.upsert(record("Orders", vec![1.0])).await.unwrap();
        assert!(b.list_ids().await.unwrap().is_empty());

        b.drop_collection().await.unwrap();
        assert_eq!(a.list_ids().await.unwrap(), vec!["Orders"]);
    }

    #[tokio::test]
    async fn test_persists_across_handles() {
        let dir = TempDir::new().unwrap();
        index_in(&dir).ensure_collection().await.unwrap();
        index_in(&dir)
            .upsert(record("Orders", vec![1.0, 2.0]))
            .await
            .unwrap();

        let reopened = index_in(&dir);
        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.dimension, Some(2));
        assert!(stats.storage_bytes > 0);
    }

    #[tokio::test]
    async fn test_stats_storage_matches_database_pages() {
        let dir = TempDir::new().unwrap();
        let index = index_in(&dir);
        index.ensure_collection().await.unwrap();
        index.upsert(record("Orders", vec![1.0, 2.0])).await.unwrap();

        let stats = index.stats().await.unwrap();

        let conn = Connection::open(dir.path().join("index.sqlite")).unwrap();
        let page_count: u64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap();
        let page_size: u64 = conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stats.storage_bytes, page_count * page_size);
    }

    #[tokio::test]
    async fn test_stats_on_unreadable_file_is_vector_index_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.sqlite");
        std::fs::write(&path, b"not a sqlite database, just some bytes").unwrap();

        let err = SqliteVectorIndex::new(&path, "northwind_schema")
            .stats()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VECTOR_INDEX_ERROR");
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[], &[]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
    }

    #[test]
    fn test_vector_bytes_round_trip() {
        let v = vec![0.5, -1.25, 3.0];
        assert_eq!(bytes_to_vec(&vec_to_bytes(&v)).unwrap(), v);
        assert!(bytes_to_vec(&[0, 1, 2]).is_err());
    }
}
