//! Error types for the RAG pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
///
/// The first five variants form the taxonomy callers branch on: user-correctable
/// input problems (`UnsupportedFormat`, `ParseFailure`) versus backend outages
/// (`EmbeddingUnavailable`, `GenerationFailed`, `IndexUnavailable`).
#[derive(Debug, Error)]
pub enum Error {
    /// Extension outside the supported set; raised before any parser runs
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Malformed or corrupt source document
    #[error("Failed to parse {format} document: {message}")]
    ParseFailure { format: String, message: String },

    /// Embedding backend failed after exhausting retries
    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Generative backend error (timeout, quota, malformed response)
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Vector index storage unreachable or rejected the operation
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request input (e.g. undecodable query image)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The named document has nothing indexed
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse failure
    pub fn parse(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseFailure {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable(message.into())
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed(message.into())
    }

    /// Create an index error
    pub fn index(message: impl Into<String>) -> Self {
        Self::IndexUnavailable(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the caller can fix this by changing its input
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::ParseFailure { .. }
                | Self::InvalidRequest(_)
                | Self::NotFound(_)
        )
    }

    /// Whether retrying the whole operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable(_) | Self::GenerationFailed(_) | Self::IndexUnavailable(_)
        )
    }

    /// Stable snake_case name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::ParseFailure { .. } => "parse_failure",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::GenerationFailed(_) => "generation_failed",
            Self::IndexUnavailable(_) => "index_unavailable",
            Self::Config(_) => "config_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::IndexUnavailable(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::ParseFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::InvalidRequest(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::EmbeddingUnavailable(_) | Error::GenerationFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::IndexUnavailable(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
            }
        }));

        (status, body).into_response()
    }
}
