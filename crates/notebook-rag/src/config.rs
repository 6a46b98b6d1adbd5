//! Configuration for the RAG pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main RAG pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Generation backend configuration
    pub llm: LlmConfig,
    /// Vector index configuration
    pub vector_db: VectorDbConfig,
    /// Parser configuration
    pub ingestion: IngestionConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Document summarization configuration
    pub summary: SummaryConfig,
}

impl RagConfig {
    /// Load from a TOML file, then apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing sections take their defaults
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override selected fields from `NOTEBOOK_RAG_*` and provider variables
    pub fn apply_env_overrides(&mut self) {
        if let Some(host) = env_var("NOTEBOOK_RAG_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_var("NOTEBOOK_RAG_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(db) = env_var("NOTEBOOK_RAG_DB") {
            self.vector_db.storage_path = PathBuf::from(db);
        }
        if let Some(url) = env_var("OLLAMA_HOST") {
            self.embeddings.base_url = url.clone();
            if self.llm.backend == GenerationBackendKind::Ollama {
                self.llm.base_url = Some(url);
            }
        }
        if let Some(model) = env_var("NOTEBOOK_RAG_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = env_var("ANTHROPIC_API_KEY") {
            self.llm.api_key = Some(key);
        }
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be positive".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.chunking.position_bucket_size == 0 {
            return Err(Error::Config(
                "chunking.position_bucket_size must be positive".into(),
            ));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be positive".into()));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::Config("embeddings.batch_size must be positive".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be positive".into()));
        }
        if self.summary.batch_chars == 0 {
            return Err(Error::Config("summary.batch_chars must be positive".into()));
        }
        if !(1..=100).contains(&self.ingestion.image_jpeg_quality) {
            return Err(Error::Config(
                "ingestion.image_jpeg_quality must be within 1..=100".into(),
            ));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// Ollama `/api/embed`
    #[default]
    Ollama,
    /// Offline feature hashing
    Hashing,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackendKind,
    /// Ollama base URL
    pub base_url: String,
    /// Model to use
    pub model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Batch size for embedding requests
    pub batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 32,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum split size in characters
    pub chunk_size: usize,
    /// Overlap carried between adjacent splits in characters
    pub chunk_overlap: usize,
    /// Elements per approximate position for formats without pagination
    pub position_bucket_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            position_bucket_size: 3,
        }
    }
}

/// Generation backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackendKind {
    /// Anthropic Messages API
    #[default]
    Anthropic,
    /// Ollama `/api/chat`
    Ollama,
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: GenerationBackendKind,
    /// API base URL; defaults per backend
    pub base_url: Option<String>,
    /// Generation model name
    pub model: String,
    /// API key (Anthropic only)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tokens in the answer
    pub max_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackendKind::Anthropic,
            base_url: None,
            model: "claude-3-5-sonnet-latest".to_string(),
            api_key: None,
            temperature: 0.3,
            max_tokens: 1000,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    /// Configured base URL or the backend's public default
    pub fn endpoint(&self) -> &str {
        match (&self.base_url, self.backend) {
            (Some(url), _) => url,
            (None, GenerationBackendKind::Anthropic) => "https://api.anthropic.com",
            (None, GenerationBackendKind::Ollama) => "http://localhost:11434",
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// SQLite database file
    pub storage_path: PathBuf,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        let storage_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notebook-rag")
            .join("index.db");
        Self { storage_path }
    }
}

/// Parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Timeout for parsing a single document in seconds
    pub parse_timeout_secs: u64,
    /// Run tesseract over image uploads
    pub ocr_enabled: bool,
    /// Tesseract language code
    pub ocr_language: String,
    /// JPEG quality for re-encoded image payloads
    pub image_jpeg_quality: u8,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            parse_timeout_secs: 300,
            ocr_enabled: true,
            ocr_language: "eng".to_string(),
            image_jpeg_quality: 85,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks placed into context per question
    pub top_k: usize,
    /// Hits scoring below this are dropped (0.0 disables)
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
        }
    }
}

/// Map-reduce summarization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Chunk text per map request, in characters
    pub batch_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self { batch_chars: 12_000 }
    }
}
