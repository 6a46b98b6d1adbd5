//! Query-time retrieval over the vector index

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::index::{IndexHit, VectorIndex};
use crate::providers::EmbeddingProvider;
use crate::types::MetadataFilter;

/// Embeds a question and fetches the closest chunks
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    min_score: f32,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            min_score: 0.0,
        }
    }

    /// Drop hits scoring below `min_score` (0.0 keeps everything)
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Top `k` hits for `query`, best first
    pub async fn retrieve(&self, query: &str, k: usize, filter: &MetadataFilter) -> Result<Vec<IndexHit>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidRequest("query must not be empty".into()));
        }

        let vector = self.embedder.embed_query(query).await?;
        let mut hits = self.index.query(&vector, k, filter).await?;

        if self.min_score > 0.0 {
            let before = hits.len();
            hits.retain(|hit| hit.score >= self.min_score);
            if hits.len() < before {
                tracing::debug!(
                    "Dropped {} hits under min_score {}",
                    before - hits.len(),
                    self.min_score
                );
            }
        }

        tracing::debug!(
            "Retrieved {} chunks for query ({} requested)",
            hits.len(),
            k
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SqliteVectorIndex;
    use crate::providers::HashingEmbedder;
    use crate::types::{Chunk, ChunkKind, EmbeddedChunk};

    async fn seeded() -> Retriever {
        let embedder = Arc::new(HashingEmbedder::new(256).unwrap());
        let index = Arc::new(SqliteVectorIndex::in_memory(256).unwrap());

        let texts = [
            "The capital of France is Paris.",
            "Photosynthesis converts light into chemical energy.",
            "Quarterly revenue grew by twelve percent.",
        ];
        let vectors = embedder
            .embed(&texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        let entries = texts
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| {
                EmbeddedChunk::new("facts", i, Chunk::new(ChunkKind::Text, *text, 1), vector)
            })
            .collect();
        index.replace_document("facts", entries).await.unwrap();

        Retriever::new(embedder, index)
    }

    #[tokio::test]
    async fn test_best_match_first() {
        let retriever = seeded().await;
        let hits = retriever
            .retrieve("What is the capital of France?", 2, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "facts:0");
    }

    #[tokio::test]
    async fn test_min_score_drops_weak_hits() {
        let retriever = seeded().await.with_min_score(0.99);
        let hits = retriever
            .retrieve("The capital of France is Paris.", 3, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "facts:0");
    }

    #[tokio::test]
    async fn test_empty_query_is_invalid() {
        let retriever = seeded().await;
        assert!(matches!(
            retriever.retrieve(" ", 5, &MetadataFilter::new()).await,
            Err(Error::InvalidRequest(_))
        ));
    }
}
