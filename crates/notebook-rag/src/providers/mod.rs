//! Provider abstractions for embeddings and answer generation
//!
//! The pipeline is written against the traits here so that backends can be
//! swapped by configuration: Ollama or feature hashing for embeddings,
//! Anthropic or Ollama for generation.

pub mod anthropic;
pub mod embedding;
pub mod hashing;
pub mod llm;
pub mod ollama;
pub mod retry;

use std::sync::Arc;

use crate::config::{EmbeddingBackendKind, EmbeddingConfig, GenerationBackendKind, LlmConfig};
use crate::error::Result;

pub use anthropic::AnthropicClient;
pub use embedding::EmbeddingProvider;
pub use hashing::HashingEmbedder;
pub use llm::GenerationBackend;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaGenerator};
pub use retry::{AttemptError, RetryPolicy};

/// Build the configured embedding backend
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(match config.backend {
        EmbeddingBackendKind::Ollama => Arc::new(OllamaEmbedder::new(config)?),
        EmbeddingBackendKind::Hashing => Arc::new(HashingEmbedder::new(config.dimensions)?),
    })
}

/// Build the configured generation backend
pub fn generator_from_config(config: &LlmConfig) -> Result<Arc<dyn GenerationBackend>> {
    Ok(match config.backend {
        GenerationBackendKind::Anthropic => Arc::new(AnthropicClient::new(config)?),
        GenerationBackendKind::Ollama => Arc::new(OllamaGenerator::new(config)?),
    })
}
