//! Core types for the RAG pipeline

pub mod chunk;
pub mod document;
pub mod query;
pub mod response;

pub use chunk::{chunk_id, Chunk, ChunkKind, EmbeddedChunk};
pub use document::FileType;
pub use query::{MetadataFilter, QueryRequest};
pub use response::{DeleteResponse, IngestResponse, QueryResult, SourceRef, SummaryResponse};
