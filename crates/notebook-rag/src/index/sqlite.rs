//! SQLite-backed vector index
//!
//! Vectors are stored as little-endian f32 blobs next to the chunk text and
//! metadata. Queries score every candidate row by cosine similarity; the
//! `document_id` and `kind` constraints of a filter narrow the candidate set
//! in SQL, the remaining keys are checked against the decoded metadata.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::{IndexHit, VectorIndex};
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkKind, EmbeddedChunk, MetadataFilter};

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        document_id TEXT NOT NULL,
        ordinal INTEGER NOT NULL,
        kind TEXT NOT NULL,
        position INTEGER NOT NULL,
        text TEXT NOT NULL,
        metadata TEXT NOT NULL,
        vector BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, ordinal);
    CREATE INDEX IF NOT EXISTS idx_chunks_kind ON chunks(kind);
"#;

const SELECT_COLUMNS: &str = "seq, id, document_id, ordinal, kind, position, text, metadata, vector";

/// Vector index persisted in a single SQLite file
pub struct SqliteVectorIndex {
    conn: Arc<Mutex<Connection>>,
    dimensions: usize,
}

impl SqliteVectorIndex {
    /// Open or create the index at `path`
    ///
    /// An existing index built with a different vector dimension is rejected.
    pub fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::index(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::index(format!("Failed to open {}: {}", path.display(), e)))?;
        let index = Self::from_connection(conn, dimensions)?;
        tracing::info!(
            "Opened vector index at {} ({} dims)",
            path.display(),
            dimensions
        );
        Ok(index)
    }

    /// Create an in-memory index (for testing)
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, dimensions)
    }

    fn from_connection(conn: Connection, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Config("vector index needs a positive dimension".into()));
        }
        migrate(&conn, dimensions)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimensions,
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut *guard)
        })
        .await
        .map_err(|e| Error::index(format!("index task failed: {}", e)))?
    }

    fn check_vector(&self, id: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::index(format!(
                "vector for {} has dimension {}, index expects {}",
                id,
                vector.len(),
                self.dimensions
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::index(format!("vector for {} has non-finite values", id)));
        }
        if vector.iter().all(|v| *v == 0.0) {
            return Err(Error::index(format!("vector for {} has zero norm", id)));
        }
        Ok(())
    }
}

fn migrate(conn: &Connection, dimensions: usize) -> Result<()> {
    // In-memory databases report "memory" instead of "wal"
    let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    conn.execute_batch(
        r#"
        PRAGMA synchronous=NORMAL;
        PRAGMA temp_store=MEMORY;
        "#,
    )?;
    conn.execute_batch(SCHEMA_SQL)?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = 'dimensions'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(value) if value != dimensions.to_string() => Err(Error::Config(format!(
            "index was built with {} dimensions, configured embedder produces {}",
            value, dimensions
        ))),
        Some(_) => Ok(()),
        None => {
            conn.execute(
                "INSERT INTO index_meta (key, value) VALUES ('dimensions', ?1)",
                params![dimensions.to_string()],
            )?;
            Ok(())
        }
    }
}

fn insert_entry(tx: &Transaction<'_>, entry: &EmbeddedChunk) -> Result<()> {
    let metadata = serde_json::to_string(&entry.chunk.metadata)?;
    // REPLACE deletes the old row, so the entry gets a fresh sequence number
    tx.execute(
        r#"
        INSERT OR REPLACE INTO chunks (id, document_id, ordinal, kind, position, text, metadata, vector)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            entry.id,
            entry.document_id,
            entry.ordinal as i64,
            entry.chunk.kind.as_str(),
            i64::from(entry.chunk.position),
            entry.chunk.text,
            metadata,
            encode_vector(&entry.vector),
        ],
    )?;
    Ok(())
}

/// Row decoded from the `chunks` table
struct StoredRow {
    seq: i64,
    entry: EmbeddedChunk,
}

type RawRow = (i64, String, String, i64, String, i64, String, String, Vec<u8>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn decode_row(raw: RawRow, dimensions: usize) -> Result<StoredRow> {
    let (seq, id, document_id, ordinal, kind, position, text, metadata, blob) = raw;
    let kind = ChunkKind::parse(&kind)
        .ok_or_else(|| Error::index(format!("unknown chunk kind '{}' for {}", kind, id)))?;
    let position = u32::try_from(position)
        .map_err(|_| Error::index(format!("position {} out of range for {}", position, id)))?;
    let ordinal = usize::try_from(ordinal)
        .map_err(|_| Error::index(format!("ordinal {} out of range for {}", ordinal, id)))?;
    let metadata: HashMap<String, serde_json::Value> = serde_json::from_str(&metadata)
        .map_err(|e| Error::index(format!("corrupt metadata for {}: {}", id, e)))?;

    Ok(StoredRow {
        seq,
        entry: EmbeddedChunk {
            id,
            document_id,
            ordinal,
            chunk: Chunk {
                text,
                kind,
                position,
                metadata,
            },
            vector: decode_vector(&blob, dimensions)?,
        },
    })
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(blob: &[u8], dimensions: usize) -> Result<Vec<f32>> {
    let expected = dimensions * std::mem::size_of::<f32>();
    if blob.len() != expected {
        return Err(Error::index(format!(
            "invalid vector byte length: expected {}, got {}",
            expected,
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some((dot / denom) as f32)
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn replace_document(&self, document_id: &str, entries: Vec<EmbeddedChunk>) -> Result<usize> {
        for entry in &entries {
            if entry.document_id != document_id {
                return Err(Error::internal(format!(
                    "entry {} does not belong to document {}",
                    entry.id, document_id
                )));
            }
            self.check_vector(&entry.id, &entry.vector)?;
        }

        let document_id = document_id.to_string();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM chunks WHERE document_id = ?1",
                params![document_id],
            )?;
            for entry in &entries {
                insert_entry(&tx, entry)?;
            }
            tx.commit()?;

            tracing::debug!(
                "Replaced {} chunks of {} with {}",
                removed,
                document_id,
                entries.len()
            );
            Ok(entries.len())
        })
        .await
    }

    async fn upsert(&self, entry: EmbeddedChunk) -> Result<()> {
        self.check_vector(&entry.id, &entry.vector)?;
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            insert_entry(&tx, &entry)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn query(&self, vector: &[f32], k: usize, filter: &MetadataFilter) -> Result<Vec<IndexHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.check_vector("query", vector)?;

        let query = vector.to_vec();
        let filter = filter.clone();
        let dimensions = self.dimensions;

        self.blocking(move |conn| {
            let mut sql = format!("SELECT {} FROM chunks", SELECT_COLUMNS);
            let mut clauses = Vec::new();
            let mut values = Vec::new();
            if let Some(document_id) = filter.document_id() {
                values.push(SqlValue::Text(document_id.to_string()));
                clauses.push(format!("document_id = ?{}", values.len()));
            }
            if let Some(kind) = filter.kind() {
                values.push(SqlValue::Text(kind.to_string()));
                clauses.push(format!("kind = ?{}", values.len()));
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), read_row)?;

            let mut scored: Vec<(f32, StoredRow)> = Vec::new();
            for row in rows {
                let stored = decode_row(row?, dimensions)?;
                if !filter.matches(&stored.entry.chunk.metadata) {
                    continue;
                }
                let Some(score) = cosine_similarity(&query, &stored.entry.vector) else {
                    continue;
                };
                scored.push((score, stored));
            }

            scored.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.1.seq.cmp(&a.1.seq))
            });
            scored.truncate(k);

            Ok(scored
                .into_iter()
                .map(|(score, stored)| IndexHit {
                    id: stored.entry.id,
                    document_id: stored.entry.document_id,
                    chunk: stored.entry.chunk,
                    score,
                })
                .collect())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<EmbeddedChunk>> {
        let id = id.to_string();
        let dimensions = self.dimensions;
        self.blocking(move |conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {} FROM chunks WHERE id = ?1", SELECT_COLUMNS),
                    params![id],
                    read_row,
                )
                .optional()?;
            raw.map(|raw| decode_row(raw, dimensions).map(|stored| stored.entry))
                .transpose()
        })
        .await
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let document_id = document_id.to_string();
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM chunks WHERE document_id = ?1",
                params![document_id],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn document_chunk_ids(&self, document_id: &str) -> Result<Vec<String>> {
        let document_id = document_id.to_string();
        self.blocking(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM chunks WHERE document_id = ?1 ORDER BY ordinal ASC")?;
            let ids = stmt
                .query_map(params![document_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<EmbeddedChunk>> {
        let document_id = document_id.to_string();
        let dimensions = self.dimensions;
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chunks WHERE document_id = ?1 ORDER BY ordinal ASC",
                SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![document_id], read_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|raw| decode_row(raw, dimensions).map(|stored| stored.entry))
                .collect()
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
            Ok(count.max(0) as usize)
        })
        .await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
