//! Chunk types with position tracking for citations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Metadata key holding a base64 image payload on image chunks
pub const IMAGE_PAYLOAD_KEY: &str = "image_base64";

/// Metadata key marking a bucketed (non-native) position
pub const APPROXIMATE_POSITION_KEY: &str = "position_approximate";

/// Kind of content a chunk carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Text,
    Image,
    Table,
    Code,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Table => "table",
            Self::Code => "code",
        }
    }

    /// Parse the stored lowercase form
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "table" => Some(Self::Table),
            "code" => Some(Self::Code),
            _ => None,
        }
    }

    /// Whether the normalizer may split elements of this kind
    pub fn is_splittable(&self) -> bool {
        matches!(self, Self::Text)
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The atomic retrievable unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Extracted or rendered content
    pub text: String,
    /// Content kind
    pub kind: ChunkKind,
    /// Page/slide/sheet number, or an approximate bucket (1-based)
    pub position: u32,
    /// Open metadata (document id, title, sheet name, cell type, ...)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(kind: ChunkKind, text: impl Into<String>, position: u32) -> Self {
        Self {
            text: text.into(),
            kind,
            position,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Check the non-empty-text invariant
    pub fn validate(&self) -> Result<()> {
        if self.kind != ChunkKind::Image && self.text.trim().is_empty() {
            return Err(Error::internal(format!(
                "{} chunk at position {} has empty text",
                self.kind, self.position
            )));
        }
        if self.kind == ChunkKind::Image
            && self.text.trim().is_empty()
            && !self.metadata.contains_key(IMAGE_PAYLOAD_KEY)
        {
            return Err(Error::internal(format!(
                "image chunk at position {} has neither caption nor payload",
                self.position
            )));
        }
        Ok(())
    }

    /// Whether the position was bucketed rather than read from the format
    pub fn is_position_approximate(&self) -> bool {
        self.metadata
            .get(APPROXIMATE_POSITION_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Text submitted to the embedding model
    ///
    /// Image chunks without a caption embed a short description built from
    /// their metadata so the vector is never degenerate.
    pub fn embedding_text(&self) -> String {
        if !self.text.trim().is_empty() {
            return self.text.clone();
        }
        let title = self
            .metadata
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("untitled document");
        format!("{} on page {} of {}", self.kind, self.position, title)
    }
}

/// Deterministic chunk identifier
pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    format!("{}:{}", document_id, ordinal)
}

/// A chunk plus its identity and vector, as stored in the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    /// `{document_id}:{ordinal}`
    pub id: String,
    /// Owning document
    pub document_id: String,
    /// Index within the document's normalized chunk sequence
    pub ordinal: usize,
    /// Chunk content
    pub chunk: Chunk,
    /// Embedding vector
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn new(document_id: &str, ordinal: usize, chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk_id(document_id, ordinal),
            document_id: document_id.to_string(),
            ordinal,
            chunk,
            vector,
        }
    }
}

/// L2 norm of a vector
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Normalize in place; returns false for zero-norm or non-finite input
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm = l2_norm(vector);
    if !norm.is_finite() || norm <= f32::EPSILON {
        return false;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
    true
}
