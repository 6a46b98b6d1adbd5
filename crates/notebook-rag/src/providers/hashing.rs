//! Deterministic feature-hashing embedder
//!
//! Words and character trigrams are hashed into a fixed number of signed
//! buckets. No model, no network; identical input always yields the same
//! vector, which makes it suitable for offline use and tests.

use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use super::embedding::{finalize_vectors, EmbeddingProvider};
use crate::error::{Error, Result};

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Offline embedder over hashed word and trigram features
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Config("hashing embedder needs at least one dimension".into()));
        }
        Ok(Self { dimensions })
    }

    /// Unnormalized feature vector
    fn features(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let mut any = false;

        for word in lowered.unicode_words() {
            any = true;
            self.add(&mut vector, word.as_bytes(), WORD_WEIGHT);

            let padded: Vec<char> = format!("^{}$", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add(&mut vector, trigram.as_bytes(), TRIGRAM_WEIGHT);
            }
        }

        // Punctuation-only or empty input still gets a stable direction
        if !any {
            let trimmed = lowered.trim();
            let feature = if trimmed.is_empty() { "<empty>" } else { trimmed };
            self.add(&mut vector, feature.as_bytes(), WORD_WEIGHT);
        }

        vector
    }

    fn add(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// 64-bit FNV-1a
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = texts.iter().map(|t| self.features(t)).collect();
        finalize_vectors(vectors, texts.len(), self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::chunk::l2_norm;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_query_matches_document_embedding() {
        let embedder = HashingEmbedder::new(256).unwrap();
        let text = "The capital of France is Paris.";
        let docs = embedder.embed(&[text.to_string()]).await.unwrap();
        let query = embedder.embed_query(text).await.unwrap();
        assert_eq!(docs[0], query);
        assert!((l2_norm(&query) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::new(512).unwrap();
        let texts = vec![
            "The capital of France is Paris.".to_string(),
            "Quarterly revenue grew by twelve percent.".to_string(),
        ];
        let docs = embedder.embed(&texts).await.unwrap();
        let query = embedder
            .embed_query("What is the capital of France?")
            .await
            .unwrap();
        assert!(cosine(&query, &docs[0]) > cosine(&query, &docs[1]));
    }

    #[tokio::test]
    async fn test_degenerate_input_still_embeds() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let vectors = embedder
            .embed(&["".to_string(), "!!!".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 64);
    }
}
