//! Document ingestion: format parsing and chunk normalization

pub mod chunker;
pub mod formats;
mod parser;

pub use chunker::ChunkNormalizer;
pub use parser::{assign_positions, content_hash, ParseOptions, RawElement};
