//! Prompt templates for RAG generation

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;

use super::{GenerationRequest, Part, Turn};
use crate::error::{Error, Result};
use crate::index::IndexHit;
use crate::types::ChunkKind;

const SYSTEM_PROMPT: &str = r#"You are a document-grounded assistant that ONLY uses information from the provided context.

GROUNDING RULES:
1. Answer using ONLY information stated in the CONTEXT blocks
2. If the answer is not in the context, say that the provided documents do not contain it
3. Never use outside knowledge or guess beyond what the context states
4. Cite every claim with the marker of the block it came from, in [document_id:page] format, e.g. [report:3]
5. If several blocks support a claim, cite all of them
6. When an image is attached, describe only what is relevant to the question and relate it to the context"#;

const SUMMARY_SYSTEM_PROMPT: &str = r#"You summarize documents faithfully.

RULES:
1. Use ONLY the text you are given
2. Keep names, numbers and conclusions exactly as stated
3. Write plain prose with no preamble"#;

/// Prompt builder for RAG queries and document summaries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Assemble the request for one question
    ///
    /// The attached image (if any) comes first, then the numbered context
    /// blocks and the question.
    pub fn build(question: &str, hits: &[IndexHit], image: Option<&str>) -> Result<GenerationRequest> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidRequest("query must not be empty".into()));
        }

        let mut parts = Vec::with_capacity(2);
        if let Some(raw) = image {
            parts.push(decode_query_image(raw)?);
        }
        parts.push(Part::Text(Self::build_user_text(question, hits)));

        Ok(GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            turns: vec![Turn::user(parts)],
        })
    }

    /// Numbered context blocks followed by the question
    pub fn build_context(hits: &[IndexHit]) -> String {
        let mut context = String::new();

        for (i, hit) in hits.iter().enumerate() {
            let source = hit.source();
            let body = match hit.chunk.kind {
                ChunkKind::Image if hit.chunk.text.trim().is_empty() => format!(
                    "(image without caption on page {} of {})",
                    source.position, source.document_id
                ),
                _ => hit.chunk.text.trim().to_string(),
            };

            context.push_str(&format!(
                "[{}] {} ({})\n{}\n\n---\n\n",
                i + 1,
                source.marker(),
                hit.chunk.kind.as_str(),
                body
            ));
        }

        context
    }

    /// Map step: summarize consecutive `(page, text)` excerpts of one document
    pub fn build_summary(document_id: &str, excerpts: &[(u32, &str)]) -> GenerationRequest {
        let mut text = format!("DOCUMENT: {}\n\nEXCERPTS:\n", document_id);
        for (position, excerpt) in excerpts {
            text.push_str(&format!("[page {}]\n{}\n\n", position, excerpt));
        }
        text.push_str("Write a concise summary of these excerpts:");
        Self::summary_request(text)
    }

    /// Reduce step: merge partial summaries into one
    pub fn build_combined_summary(document_id: &str, partials: &[String]) -> GenerationRequest {
        let mut text = format!("DOCUMENT: {}\n\nPARTIAL SUMMARIES:\n", document_id);
        for (i, partial) in partials.iter().enumerate() {
            text.push_str(&format!("({}) {}\n\n", i + 1, partial));
        }
        text.push_str("Combine these partial summaries into one coherent summary of the whole document:");
        Self::summary_request(text)
    }

    fn summary_request(text: String) -> GenerationRequest {
        GenerationRequest {
            system: SUMMARY_SYSTEM_PROMPT.to_string(),
            turns: vec![Turn::user(vec![Part::Text(text)])],
        }
    }

    fn build_user_text(question: &str, hits: &[IndexHit]) -> String {
        let context = if hits.is_empty() {
            "(no matching documents)\n\n".to_string()
        } else {
            Self::build_context(hits)
        };

        format!(
            "CONTEXT:\n{context}QUESTION: {question}\n\nAnswer using only the context above and cite sources as [document_id:page]:",
            context = context,
            question = question
        )
    }
}

/// Decode a query image (bare base64 or a `data:` URL) into an image part
///
/// The format is sniffed from the decoded bytes; only PNG, JPEG, GIF and
/// WebP are accepted.
pub fn decode_query_image(raw: &str) -> Result<Part> {
    let trimmed = raw.trim();
    let encoded = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| Error::InvalidRequest("malformed data URL for image".into()))?,
        None => trimmed,
    };
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(Error::InvalidRequest("image payload is empty".into()));
    }

    let bytes = STANDARD
        .decode(&cleaned)
        .map_err(|e| Error::InvalidRequest(format!("image is not valid base64: {}", e)))?;

    let media_type = match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(other) => {
            return Err(Error::InvalidRequest(format!(
                "unsupported image format: {:?}",
                other
            )))
        }
        Err(_) => return Err(Error::InvalidRequest("image format not recognized".into())),
    };

    Ok(Part::Image {
        media_type: media_type.to_string(),
        data: cleaned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    fn hit(document_id: &str, ordinal: usize, kind: ChunkKind, text: &str, position: u32) -> IndexHit {
        IndexHit {
            id: crate::types::chunk_id(document_id, ordinal),
            document_id: document_id.to_string(),
            chunk: Chunk::new(kind, text, position),
            score: 0.9,
        }
    }

    #[test]
    fn test_context_blocks_are_numbered_with_markers() {
        let hits = vec![
            hit("geo", 0, ChunkKind::Text, "The capital of France is Paris.", 1),
            hit("sheet", 2, ChunkKind::Table, "city | pop", 2),
        ];
        let request = PromptBuilder::build("What is the capital of France?", &hits, None).unwrap();

        assert!(request.system.contains("[document_id:page]"));
        assert_eq!(request.turns.len(), 1);
        assert_eq!(request.image_count(), 0);

        let text = request.text();
        let first = text.find("[1] [geo:1] (text)").unwrap();
        let second = text.find("[2] [sheet:2] (table)").unwrap();
        let question = text.find("QUESTION: What is the capital of France?").unwrap();
        assert!(first < second && second < question);
    }

    #[test]
    fn test_summary_prompts() {
        let request = PromptBuilder::build_summary("essay", &[(1, "Rivers flow."), (2, "Hills rise.")]);
        let text = request.text();
        assert!(request.system.contains("faithfully"));
        assert!(text.starts_with("DOCUMENT: essay"));
        assert!(text.find("[page 1]\nRivers flow.").unwrap() < text.find("[page 2]\nHills rise.").unwrap());

        let partials = vec!["About rivers.".to_string(), "About hills.".to_string()];
        let text = PromptBuilder::build_combined_summary("essay", &partials).text();
        assert!(text.contains("PARTIAL SUMMARIES:\n(1) About rivers."));
        assert!(text.contains("(2) About hills."));
    }

    #[test]
    fn test_image_part_comes_first() {
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(PNG_HEADER));
        let request = PromptBuilder::build("What is shown?", &[], Some(&data_url)).unwrap();

        let parts = &request.turns[0].parts;
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], Part::Image { media_type, .. } if media_type == "image/png"));
        assert!(parts[1].text().unwrap().contains("(no matching documents)"));
    }

    #[test]
    fn test_uncaptioned_image_gets_placeholder() {
        let hits = vec![hit("deck", 4, ChunkKind::Image, "", 2)];
        let context = PromptBuilder::build_context(&hits);
        assert!(context.contains("(image without caption on page 2 of deck)"));
    }

    #[test]
    fn test_invalid_images_are_rejected() {
        assert!(matches!(
            decode_query_image("not base64!!"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            decode_query_image(&STANDARD.encode(b"plain text, not an image")),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(decode_query_image("   "), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_empty_question_is_rejected() {
        assert!(matches!(
            PromptBuilder::build("  ", &[], None),
            Err(Error::InvalidRequest(_))
        ));
    }
}
