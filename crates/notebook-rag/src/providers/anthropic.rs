//! Anthropic Messages API generation backend

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::generation::{GenerationRequest, Part, Role};

use super::llm::GenerationBackend;
use super::retry::{AttemptError, RetryPolicy};

const API_VERSION: &str = "2023-06-01";

/// Client for `POST /v1/messages`
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl AnthropicClient {
    /// Create a client; fails without an API key
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::Config("llm.api_key (or ANTHROPIC_API_KEY) is required for anthropic".into())
            })?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.endpoint().trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| Error::Config("invalid Anthropic API key".into()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: &request.system,
            messages: request
                .turns
                .iter()
                .map(|turn| Message {
                    role: match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: turn
                        .parts
                        .iter()
                        .map(|part| match part {
                            Part::Text(text) => ContentBlock::Text { text },
                            Part::Image { media_type, data } => ContentBlock::Image {
                                source: ImageSource {
                                    kind: "base64",
                                    media_type,
                                    data,
                                },
                            },
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    async fn send(
        &self,
        body: &MessagesRequest<'_>,
        headers: &HeaderMap,
    ) -> std::result::Result<String, AttemptError> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                AttemptError::Transient(Error::generation(format!(
                    "Anthropic request failed: {}",
                    e
                )))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(AttemptError::from_status(
                status,
                Error::generation(format!("Anthropic returned {}: {}", status, text)),
            ));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            AttemptError::Permanent(Error::generation(format!(
                "Failed to parse Anthropic response: {}",
                e
            )))
        })?;
        parsed.answer().map_err(AttemptError::Permanent)
    }
}

#[async_trait]
impl GenerationBackend for AnthropicClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let headers = self.headers()?;
        let body = self.body(request);

        tracing::info!("Generating answer with model: {}", self.model);
        self.retry
            .run("Anthropic messages", || self.send(&body, &headers))
            .await
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    fn answer(self) -> Result<String> {
        let answer = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if answer.trim().is_empty() {
            return Err(Error::generation("Anthropic response missing text content"));
        }
        Ok(answer)
    }
}
