//! Format dispatch and raw element model

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::formats;
use crate::config::RagConfig;
use crate::error::Result;
use crate::types::chunk::{ChunkKind, APPROXIMATE_POSITION_KEY, IMAGE_PAYLOAD_KEY};
use crate::types::FileType;

/// One structural unit produced by a format parser
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub kind: ChunkKind,
    pub text: String,
    /// Native page/slide/sheet number; `None` until positions are assigned
    pub position: Option<u32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RawElement {
    pub fn new(kind: ChunkKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            position: None,
            metadata: HashMap::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ChunkKind::Text, text)
    }

    pub fn table(text: impl Into<String>) -> Self {
        Self::new(ChunkKind::Table, text)
    }

    pub fn code(text: impl Into<String>) -> Self {
        Self::new(ChunkKind::Code, text)
    }

    /// Image element carrying an encoded payload and an optional caption
    pub fn image(caption: impl Into<String>, payload: formats::image::ImagePayload) -> Self {
        Self::new(ChunkKind::Image, caption)
            .with_meta(IMAGE_PAYLOAD_KEY, payload.base64)
            .with_meta("mime_type", payload.mime_type)
            .with_meta("width", payload.width)
            .with_meta("height", payload.height)
    }

    /// Set a native position
    pub fn at(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Whether the element carries nothing worth indexing
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && !self.metadata.contains_key(IMAGE_PAYLOAD_KEY)
    }
}

/// Parser settings
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Elements per approximate position
    pub position_bucket_size: usize,
    /// Run OCR over raster images
    pub ocr_enabled: bool,
    /// Tesseract language code
    pub ocr_language: String,
    /// JPEG quality for re-encoded image payloads
    pub jpeg_quality: u8,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            position_bucket_size: 3,
            ocr_enabled: true,
            ocr_language: "eng".to_string(),
            jpeg_quality: 85,
        }
    }
}

impl From<&RagConfig> for ParseOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            position_bucket_size: config.chunking.position_bucket_size,
            ocr_enabled: config.ingestion.ocr_enabled,
            ocr_language: config.ingestion.ocr_language.clone(),
            jpeg_quality: config.ingestion.image_jpeg_quality,
        }
    }
}

impl FileType {
    /// Parse raw bytes into an ordered element sequence with positions assigned
    ///
    /// Any failure rejects the whole document; no partial list is returned.
    pub fn parse(&self, data: &[u8], options: &ParseOptions) -> Result<Vec<RawElement>> {
        let elements = match self {
            FileType::Pdf => formats::pdf::parse(data, options)?,
            FileType::Docx => formats::office::parse_docx(data, options)?,
            FileType::Pptx => formats::office::parse_pptx(data, options)?,
            FileType::Xlsx => formats::spreadsheet::parse_xlsx(data)?,
            FileType::Csv => formats::spreadsheet::parse_csv(data)?,
            FileType::Markdown => formats::markup::parse_markdown(data)?,
            FileType::Html => formats::markup::parse_html(data)?,
            FileType::Notebook => formats::notebook::parse(data, options)?,
            FileType::Png | FileType::Jpeg => formats::image::parse(data, options)?,
        };

        let elements: Vec<RawElement> = elements.into_iter().filter(|e| !e.is_blank()).collect();
        tracing::debug!("Parsed {} {} elements", elements.len(), self);

        Ok(assign_positions(elements, options.position_bucket_size))
    }
}

/// Fill missing positions with `ordinal / bucket_size + 1` and flag them
pub fn assign_positions(elements: Vec<RawElement>, bucket_size: usize) -> Vec<RawElement> {
    let bucket_size = bucket_size.max(1);
    elements
        .into_iter()
        .enumerate()
        .map(|(ordinal, mut element)| {
            if element.position.is_none() {
                element.position = Some((ordinal / bucket_size) as u32 + 1);
                element
                    .metadata
                    .insert(APPROXIMATE_POSITION_KEY.to_string(), true.into());
            }
            element
        })
        .collect()
}

/// SHA-256 of the source bytes, hex encoded
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucketed_positions() {
        let elements = (0..7).map(|i| RawElement::text(format!("p{}", i))).collect();
        let positions: Vec<u32> = assign_positions(elements, 3)
            .iter()
            .map(|e| e.position.unwrap())
            .collect();
        assert_eq!(positions, vec![1, 1, 1, 2, 2, 2, 3]);
    }

    #[test]
    fn test_native_positions_kept() {
        let elements = vec![RawElement::text("a").at(4), RawElement::text("b")];
        let assigned = assign_positions(elements, 3);
        assert_eq!(assigned[0].position, Some(4));
        assert!(!assigned[0].metadata.contains_key(APPROXIMATE_POSITION_KEY));
        assert_eq!(assigned[1].position, Some(1));
        assert_eq!(assigned[1].metadata[APPROXIMATE_POSITION_KEY], true);
    }

    #[test]
    fn test_bucket_size_is_configurable() {
        let elements = (0..4).map(|i| RawElement::text(format!("p{}", i))).collect();
        let positions: Vec<u32> = assign_positions(elements, 1)
            .iter()
            .map(|e| e.position.unwrap())
            .collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_eq!(content_hash(b"abc").len(), 64);
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
    }
}
