//! Ollama-based providers for embeddings and generation

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::generation::{GenerationRequest, Part, Role};

use super::embedding::{finalize_vectors, EmbeddingProvider};
use super::llm::GenerationBackend;
use super::retry::{AttemptError, RetryPolicy};

/// Ollama API client with automatic retry
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: &str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(max_retries),
        })
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// POST a JSON body; `failure` names the error raised for this endpoint
    async fn post_json<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
        failure: fn(String) -> Error,
    ) -> std::result::Result<Resp, AttemptError>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                AttemptError::Transient(failure(format!("request to {} failed: {}", url, e)))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(
                status,
                failure(format!("HTTP {} - {}", status, body)),
            ));
        }

        response.json().await.map_err(|e| {
            AttemptError::Permanent(failure(format!("failed to parse response: {}", e)))
        })
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedding provider using `/api/embed`
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = OllamaClient::new(&config.base_url, config.timeout_secs, config.max_retries)?;
        Ok(Self::from_client(client, config))
    }

    /// Create from an existing client
    pub fn from_client(client: OllamaClient, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: batch,
        };
        let response: EmbedResponse = self
            .client
            .retry
            .run("Ollama embedding", || {
                self.client
                    .post_json("/api/embed", &request, |m| Error::embedding(m))
            })
            .await?;
        finalize_vectors(response.embeddings, batch.len(), self.dimensions)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        tracing::debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Ollama generation backend using `/api/chat` (vision models accept images)
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = OllamaClient::new(config.endpoint(), config.timeout_secs, config.max_retries)?;
        Ok(Self::from_client(client, config))
    }

    /// Create from an existing client
    pub fn from_client(client: OllamaClient, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn messages(request: &GenerationRequest) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage {
            role: "system",
            content: request.system.clone(),
            images: Vec::new(),
        }];
        for turn in &request.turns {
            let mut content = Vec::new();
            let mut images = Vec::new();
            for part in &turn.parts {
                match part {
                    Part::Text(text) => content.push(text.as_str()),
                    Part::Image { data, .. } => images.push(data.clone()),
                }
            }
            messages.push(ChatMessage {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: content.join("\n\n"),
                images,
            });
        }
        messages
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: Self::messages(request),
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        tracing::info!("Generating answer with model: {}", self.model);

        let response: ChatResponse = self
            .client
            .retry
            .run("Ollama chat", || {
                self.client.post_json("/api/chat", &body, |m| Error::generation(m))
            })
            .await?;

        let answer = response.message.content.trim().to_string();
        if answer.is_empty() {
            return Err(Error::generation("Ollama returned an empty answer"));
        }
        Ok(answer)
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
