//! Vector index: durable chunk storage with cosine top-k search

mod sqlite;

pub use sqlite::SqliteVectorIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Chunk, EmbeddedChunk, MetadataFilter, SourceRef};

/// A scored index entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHit {
    /// Chunk id (`{document_id}:{ordinal}`)
    pub id: String,
    pub document_id: String,
    pub chunk: Chunk,
    /// Cosine similarity to the query vector
    pub score: f32,
}

impl IndexHit {
    pub fn source(&self) -> SourceRef {
        SourceRef::new(self.document_id.clone(), self.chunk.position)
    }
}

/// Persistent mapping from chunk id to (vector, chunk)
///
/// Writers for a single document are serialized by the caller; every
/// mutation commits atomically, so readers see either the old or the new
/// chunk set of a document.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Delete every entry of `document_id` and insert `entries` in one transaction
    async fn replace_document(&self, document_id: &str, entries: Vec<EmbeddedChunk>) -> Result<usize>;

    /// Insert or replace a single entry
    async fn upsert(&self, entry: EmbeddedChunk) -> Result<()>;

    /// Up to `k` entries by descending cosine similarity
    ///
    /// Equal scores are ordered most recently inserted first.
    async fn query(&self, vector: &[f32], k: usize, filter: &MetadataFilter) -> Result<Vec<IndexHit>>;

    async fn get(&self, id: &str) -> Result<Option<EmbeddedChunk>>;

    /// Remove a document's entries, returning how many were removed
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Chunk ids of a document in ordinal order
    async fn document_chunk_ids(&self, document_id: &str) -> Result<Vec<String>>;

    /// Stored entries of a document in ordinal order
    async fn document_chunks(&self, document_id: &str) -> Result<Vec<EmbeddedChunk>>;

    /// Total number of stored entries
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Vector dimension accepted by this index
    fn dimensions(&self) -> usize;
}
