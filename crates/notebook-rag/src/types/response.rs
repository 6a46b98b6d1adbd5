//! Response types for ingestion and queries

use serde::{Deserialize, Serialize};
use std::fmt;

use super::document::FileType;

/// Reference from an answer back to a chunk's origin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourceRef {
    /// Source document
    pub document_id: String,
    /// Page/slide/sheet number or approximate bucket
    pub position: u32,
}

impl SourceRef {
    pub fn new(document_id: impl Into<String>, position: u32) -> Self {
        Self {
            document_id: document_id.into(),
            position,
        }
    }

    /// Citation marker in `[document_id:page]` form
    pub fn marker(&self) -> String {
        format!("[{}:{}]", self.document_id, self.position)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document_id, self.position)
    }
}

/// Answer to a query, with its grounding sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Generated answer
    pub answer: String,
    /// Every chunk placed into context, in concatenation order
    pub sources: Vec<SourceRef>,
    /// Sources whose marker appears in the answer, in order of first citation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cited: Vec<SourceRef>,
}

impl QueryResult {
    /// Distinct document ids of `sources`, first occurrence order
    pub fn document_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for source in &self.sources {
            if !ids.contains(&source.document_id.as_str()) {
                ids.push(&source.document_id);
            }
        }
        ids
    }
}

/// Response from document ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Ingested document
    pub document_id: String,
    /// Detected file type
    pub file_type: FileType,
    /// Stored chunk ids in ordinal order
    pub chunk_ids: Vec<String>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Response from document deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub document_id: String,
    pub chunks_deleted: usize,
}

/// Map-reduce summary of one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub document_id: String,
    pub summary: String,
    /// Chunks whose text went into the summary
    pub chunks_summarized: usize,
    /// Map requests issued before the final merge
    pub batches: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_format() {
        assert_eq!(SourceRef::new("doc-7", 3).marker(), "[doc-7:3]");
    }

    #[test]
    fn test_document_ids_dedup_in_order() {
        let result = QueryResult {
            answer: String::new(),
            sources: vec![
                SourceRef::new("b", 1),
                SourceRef::new("a", 2),
                SourceRef::new("b", 4),
            ],
            cited: Vec::new(),
        };
        assert_eq!(result.document_ids(), vec!["b", "a"]);
    }
}
