//! Jupyter notebooks (nbformat 4)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use super::image::embedded_element;
use crate::error::{Error, Result};
use crate::ingestion::{ParseOptions, RawElement};

#[derive(Debug, Deserialize)]
struct Notebook {
    cells: Vec<Cell>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Cell {
    cell_type: String,
    #[serde(default)]
    source: MultilineText,
    #[serde(default)]
    outputs: Vec<Output>,
}

#[derive(Debug, Deserialize)]
struct Output {
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
}

/// nbformat stores text either as one string or as a list of lines
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MultilineText {
    Single(String),
    Lines(Vec<String>),
}

impl Default for MultilineText {
    fn default() -> Self {
        Self::Single(String::new())
    }
}

impl MultilineText {
    fn joined(&self) -> String {
        match self {
            Self::Single(s) => s.clone(),
            Self::Lines(lines) => lines.concat(),
        }
    }
}

/// One element per non-empty cell plus image outputs of code cells
pub fn parse(data: &[u8], options: &ParseOptions) -> Result<Vec<RawElement>> {
    let notebook: Notebook = serde_json::from_slice(data)
        .map_err(|e| Error::parse("ipynb", format!("Invalid notebook JSON: {}", e)))?;

    let language = notebook
        .metadata
        .pointer("/kernelspec/language")
        .or_else(|| notebook.metadata.pointer("/language_info/name"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let mut elements = Vec::new();
    for (index, cell) in notebook.cells.iter().enumerate() {
        let cell_number = index + 1;
        let source = cell.source.joined();

        if !source.trim().is_empty() {
            let element = match cell.cell_type.as_str() {
                "code" => {
                    let element = RawElement::code(source.trim_end());
                    match &language {
                        Some(lang) => element.with_meta("language", lang.clone()),
                        None => element,
                    }
                }
                _ => RawElement::text(source.trim()),
            };
            elements.push(
                element
                    .with_meta("cell_type", cell.cell_type.clone())
                    .with_meta("cell_number", cell_number),
            );
        }

        if cell.cell_type != "code" {
            continue;
        }
        for output in &cell.outputs {
            for mime in ["image/png", "image/jpeg"] {
                let Some(encoded) = output.data.get(mime).map(value_text) else {
                    continue;
                };
                let cleaned: String = encoded.split_whitespace().collect();
                let bytes = match STANDARD.decode(cleaned.as_bytes()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("Cell {} has undecodable {} output: {}", cell_number, mime, e);
                        continue;
                    }
                };
                if let Some(element) = embedded_element(&bytes, "", options) {
                    elements.push(
                        element
                            .with_meta("cell_type", "output")
                            .with_meta("cell_number", cell_number),
                    );
                }
            }
        }
    }

    Ok(elements)
}

/// Output payloads follow the same string-or-lines convention
fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(lines) => lines.iter().filter_map(|l| l.as_str()).collect(),
        _ => String::new(),
    }
}
