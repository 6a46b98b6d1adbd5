//! Generation backend trait for producing answers

use async_trait::async_trait;

use crate::error::Result;
use crate::generation::GenerationRequest;

/// Trait for multimodal answer generation
///
/// Implementations:
/// - `AnthropicClient`: Anthropic Messages API
/// - `OllamaGenerator`: Local Ollama server (`/api/chat`)
///
/// One call per question. Transient failures are retried inside the
/// implementation; the error returned after that is `GenerationFailed`.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate an answer for an assembled request
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Get backend name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
