//! Query request types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::chunk::ChunkKind;

/// Conjunction of metadata equality constraints
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MetadataFilter {
    pub equals: HashMap<String, serde_json::Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one document
    pub fn document(document_id: impl Into<String>) -> Self {
        Self::new().with("document_id", document_id.into())
    }

    /// Add an equality constraint
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    /// Restrict to one chunk kind
    pub fn with_kind(self, kind: ChunkKind) -> Self {
        self.with("kind", kind.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    /// Document id constraint, if any
    pub fn document_id(&self) -> Option<&str> {
        self.equals.get("document_id").and_then(|v| v.as_str())
    }

    /// Kind constraint, if any
    pub fn kind(&self) -> Option<&str> {
        self.equals.get("kind").and_then(|v| v.as_str())
    }

    /// Whether a metadata map satisfies every constraint
    pub fn matches(&self, metadata: &HashMap<String, serde_json::Value>) -> bool {
        self.equals
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

/// Query request for RAG answers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question to answer
    pub query: String,

    /// Optional base64 image (raw or `data:` URL) attached to the question
    #[serde(default)]
    pub image: Option<String>,

    /// Number of chunks to retrieve
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Metadata constraints on retrieved chunks
    #[serde(default)]
    pub filter: Option<MetadataFilter>,
}

impl QueryRequest {
    /// Create a new query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            image: None,
            top_k: None,
            filter: None,
        }
    }

    /// Attach an image
    pub fn with_image(mut self, image_base64: impl Into<String>) -> Self {
        self.image = Some(image_base64.into());
        self
    }

    /// Set the number of results to retrieve
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Restrict retrieval
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}
