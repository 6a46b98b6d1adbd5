//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::chunk::l2_normalize;

/// Trait for generating text embeddings
///
/// Implementations:
/// - `OllamaEmbedder`: Local Ollama server (nomic-embed-text)
/// - `HashingEmbedder`: Offline feature hashing, no model required
///
/// Outputs are L2-normalized and `embed_query` uses the same model and
/// normalization as `embed`, so query and document vectors are comparable.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::embedding("backend returned no vector for the query"))
    }

    /// Embedding dimensions (e.g., 768 for nomic-embed-text)
    fn dimensions(&self) -> usize;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Validate and normalize raw backend output
///
/// Rejects a count mismatch, a wrong dimension, non-finite values or a
/// zero-norm vector.
pub fn finalize_vectors(
    mut vectors: Vec<Vec<f32>>,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(Error::embedding(format!(
            "expected {} vectors, backend returned {}",
            expected,
            vectors.len()
        )));
    }
    for (i, vector) in vectors.iter_mut().enumerate() {
        if vector.len() != dimensions {
            return Err(Error::embedding(format!(
                "vector {} has dimension {}, expected {}",
                i,
                vector.len(),
                dimensions
            )));
        }
        if !l2_normalize(vector) {
            return Err(Error::embedding(format!(
                "vector {} has zero or non-finite norm",
                i
            )));
        }
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::chunk::l2_norm;

    #[test]
    fn test_finalize_normalizes() {
        let vectors = finalize_vectors(vec![vec![3.0, 4.0], vec![0.0, 2.0]], 2, 2).unwrap();
        assert!((l2_norm(&vectors[0]) - 1.0).abs() < 1e-6);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_finalize_rejects_bad_output() {
        assert!(matches!(
            finalize_vectors(vec![vec![1.0, 0.0]], 2, 2),
            Err(Error::EmbeddingUnavailable(_))
        ));
        assert!(matches!(
            finalize_vectors(vec![vec![1.0, 0.0, 0.0]], 1, 2),
            Err(Error::EmbeddingUnavailable(_))
        ));
        assert!(matches!(
            finalize_vectors(vec![vec![0.0, 0.0]], 1, 2),
            Err(Error::EmbeddingUnavailable(_))
        ));
        assert!(matches!(
            finalize_vectors(vec![vec![f32::NAN, 1.0]], 1, 2),
            Err(Error::EmbeddingUnavailable(_))
        ));
    }
}
