//! notebook-rag: multi-format document RAG with cited, multimodal answers
//!
//! Documents (PDF, Office, spreadsheets, notebooks, images, HTML, Markdown)
//! are parsed into typed elements, normalized into chunks, embedded and
//! stored in a SQLite vector index. Questions, optionally with an attached
//! image, are answered from the closest chunks with `[document_id:page]`
//! citations.
//!
//! The entry point is [`RagPipeline`]; [`server::RagServer`] exposes it over
//! HTTP.

pub mod config;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use index::{IndexHit, SqliteVectorIndex, VectorIndex};
pub use pipeline::RagPipeline;
pub use types::{
    Chunk, ChunkKind, EmbeddedChunk, FileType, MetadataFilter, QueryRequest, QueryResult,
    SourceRef, SummaryResponse,
};
