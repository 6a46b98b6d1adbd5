//! Citation extraction and linking

use regex::Regex;

use crate::types::SourceRef;

const MARKER_PATTERN: &str = r"\[\s*([^\[\]]+?)\s*:\s*(\d+)\s*\]";

/// Sources whose `[document_id:page]` marker appears in the answer
///
/// Returned in order of first citation, without duplicates. Markers that
/// name no context source are ignored.
pub fn cited_sources(answer: &str, sources: &[SourceRef]) -> Vec<SourceRef> {
    let pattern = match Regex::new(MARKER_PATTERN) {
        Ok(pattern) => pattern,
        Err(e) => {
            tracing::warn!("Citation pattern failed to compile: {}", e);
            return Vec::new();
        }
    };

    let mut cited: Vec<SourceRef> = Vec::new();
    for cap in pattern.captures_iter(answer) {
        let document_id = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let Some(position) = cap.get(2).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };

        if let Some(source) = sources
            .iter()
            .find(|s| s.document_id == document_id && s.position == position)
        {
            if !cited.contains(source) {
                cited.push(source.clone());
            }
        }
    }
    cited
}
