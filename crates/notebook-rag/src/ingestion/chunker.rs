//! Chunk normalization with recursive size/overlap splitting

use std::collections::VecDeque;

use super::parser::RawElement;
use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkKind};

/// Separators tried in order, coarsest first
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Maps raw elements to chunks, splitting long text elements
#[derive(Debug, Clone)]
pub struct ChunkNormalizer {
    /// Maximum split size in characters
    chunk_size: usize,
    /// Overlap carried into the next split
    chunk_overlap: usize,
}

impl ChunkNormalizer {
    /// Create a new normalizer
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Convert elements into chunks, preserving document order
    pub fn normalize(&self, elements: Vec<RawElement>) -> Vec<Chunk> {
        let mut chunks = Vec::with_capacity(elements.len());

        for element in elements {
            let position = element.position.unwrap_or(1);

            match element.kind {
                ChunkKind::Image => chunks.push(Chunk {
                    text: element.text.trim().to_string(),
                    kind: ChunkKind::Image,
                    position,
                    metadata: element.metadata,
                }),
                ChunkKind::Text if char_len(&element.text) > self.chunk_size => {
                    let splits = self.split_text(&element.text);
                    let total = splits.len();
                    for (index, text) in splits.into_iter().enumerate() {
                        let mut chunk = Chunk {
                            text,
                            kind: ChunkKind::Text,
                            position,
                            metadata: element.metadata.clone(),
                        };
                        if total > 1 {
                            chunk = chunk.with_meta("split_index", index);
                        }
                        chunks.push(chunk);
                    }
                }
                kind => {
                    let text = element.text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    chunks.push(Chunk {
                        text: text.to_string(),
                        kind,
                        position,
                        metadata: element.metadata,
                    });
                }
            }
        }

        tracing::debug!("Normalized into {} chunks", chunks.len());
        chunks
    }

    /// Split text recursively on [`DEFAULT_SEPARATORS`]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &DEFAULT_SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches
        let (index, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len(), ""));
        let remaining = separators.get(index + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(start, ch)| &text[start..start + ch.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut output = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                output.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if remaining.is_empty() {
                let piece = piece.trim();
                if !piece.is_empty() {
                    output.push(piece.to_string());
                }
            } else {
                output.extend(self.split_recursive(piece, remaining));
            }
        }

        if !fitting.is_empty() {
            output.extend(self.merge(&fitting, separator));
        }

        output
    }

    /// Greedily pack pieces up to `chunk_size`, carrying a trailing overlap
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.chunk_size && !window.is_empty() {
                push_joined(&mut merged, &window, separator);

                // Drop from the front until the carried overlap fits
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { separator_len }
                            > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { separator_len };
                }
            }

            let joiner = if window.is_empty() { 0 } else { separator_len };
            window.push_back(piece);
            total += len + joiner;
        }

        push_joined(&mut merged, &window, separator);
        merged
    }
}

fn push_joined(output: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        output.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
