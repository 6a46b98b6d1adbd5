//! Raster images: JPEG re-encoding for the payload, tesseract OCR for text

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Write;
use std::process::Command;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::ingestion::{ParseOptions, RawElement};

/// Image re-encoded as base64 JPEG
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub base64: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// Decode any supported raster format and re-encode as RGB8 JPEG
pub fn encode_payload(data: &[u8], quality: u8) -> Result<ImagePayload> {
    let decoded = image::load_from_memory(data)
        .map_err(|e| Error::parse("image", format!("Cannot decode image: {}", e)))?;
    encode_decoded(&decoded, quality)
}

/// Re-encode already decoded pixels as RGB8 JPEG
pub fn encode_decoded(decoded: &DynamicImage, quality: u8) -> Result<ImagePayload> {
    let rgb = decoded.to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| Error::parse("image", format!("Cannot encode JPEG: {}", e)))?;

    Ok(ImagePayload {
        base64: STANDARD.encode(&jpeg),
        mime_type: "image/jpeg".to_string(),
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Image element for media embedded in another document
///
/// Undecodable media (EMF, WMF, SVG) is skipped rather than failing the
/// containing document.
pub fn embedded_element(data: &[u8], caption: &str, options: &ParseOptions) -> Option<RawElement> {
    match encode_payload(data, options.jpeg_quality) {
        Ok(payload) => Some(RawElement::image(caption, payload)),
        Err(e) => {
            tracing::warn!("Skipping embedded image: {}", e);
            None
        }
    }
}

/// One image element plus OCR text elements
pub fn parse(data: &[u8], options: &ParseOptions) -> Result<Vec<RawElement>> {
    let payload = encode_payload(data, options.jpeg_quality)?;
    let mut elements = vec![RawElement::image("", payload)];

    if options.ocr_enabled {
        match recognize_text(data, &options.ocr_language) {
            Ok(text) => {
                for block in text.split("\n\n") {
                    let block = block.trim();
                    if !block.is_empty() {
                        elements.push(RawElement::text(block).with_meta("element", "image_text"));
                    }
                }
            }
            Err(e) => tracing::warn!("OCR skipped: {}", e),
        }
    }

    Ok(elements)
}

/// Check if tesseract is available, once per process
pub fn has_tesseract() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        Command::new("tesseract")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

/// Run tesseract over the image and return its stdout
fn recognize_text(data: &[u8], language: &str) -> Result<String> {
    if !has_tesseract() {
        return Err(Error::internal(
            "tesseract not found; install tesseract-ocr to extract text from images",
        ));
    }

    let mut input = tempfile::Builder::new()
        .prefix("notebook-rag-ocr-")
        .tempfile()?;
    input.write_all(data)?;
    input.flush()?;

    let output = Command::new("tesseract")
        .arg(input.path())
        .args(["stdout", "-l", language])
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::internal(format!("tesseract error: {}", stderr.trim())));
    }

    let text = String::from_utf8_lossy(&output.stdout).to_string();
    tracing::debug!("OCR extracted {} characters", text.len());
    Ok(text)
}
