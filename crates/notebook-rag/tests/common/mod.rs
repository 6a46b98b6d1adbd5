//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use parking_lot::Mutex;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use zip::write::SimpleFileOptions;

use notebook_rag::config::EmbeddingBackendKind;
use notebook_rag::generation::GenerationRequest;
use notebook_rag::providers::{GenerationBackend, HashingEmbedder};
use notebook_rag::{RagConfig, RagPipeline, Result, SqliteVectorIndex};

pub const DIMENSIONS: usize = 256;

type Responder = dyn Fn(&GenerationRequest) -> String + Send + Sync;

/// Generation backend that answers from a closure and records every request
pub struct ScriptedGenerator {
    respond: Box<Responder>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(respond: impl Fn(&GenerationRequest) -> String + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always returns the same answer
    pub fn fixed(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(move |_| answer.clone())
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().push(request.clone());
        Ok((self.respond)(request))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }
}

/// Offline configuration rooted in `dir`
pub fn test_config(dir: &Path) -> RagConfig {
    let mut config = RagConfig::default();
    config.embeddings.backend = EmbeddingBackendKind::Hashing;
    config.embeddings.dimensions = DIMENSIONS;
    config.vector_db.storage_path = dir.join("index.db");
    config.ingestion.ocr_enabled = false;
    config
}

/// Pipeline over a hashing embedder and an on-disk index in `dir`
pub fn pipeline_in(dir: &Path, generator: Arc<ScriptedGenerator>) -> RagPipeline {
    pipeline_with(test_config(dir), generator)
}

/// Same as [`pipeline_in`] with an adjusted configuration
pub fn pipeline_with(config: RagConfig, generator: Arc<ScriptedGenerator>) -> RagPipeline {
    let index = SqliteVectorIndex::open(&config.vector_db.storage_path, DIMENSIONS).unwrap();
    RagPipeline::new(
        config,
        Arc::new(HashingEmbedder::new(DIMENSIONS).unwrap()),
        Arc::new(index),
        generator,
    )
    .unwrap()
}

pub fn pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

pub fn docx() -> Vec<u8> {
    let cell = |text: &str| {
        TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
    };
    let mut buf = Cursor::new(Vec::new());
    Docx::new()
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Travel notes")))
        .add_paragraph(
            Paragraph::new().add_run(Run::new().add_text("The capital of France is Paris.")),
        )
        .add_table(Table::new(vec![
            TableRow::new(vec![cell("City"), cell("Country")]),
            TableRow::new(vec![cell("Paris"), cell("France")]),
        ]))
        .build()
        .pack(&mut buf)
        .unwrap();
    buf.into_inner()
}

pub fn pptx() -> Vec<u8> {
    let slide = |body: &str| {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>"#,
            body
        )
    };
    let parts = [
        (
            "ppt/slides/slide1.xml",
            slide(r#"<p:sp><p:txBody><a:p><a:r><a:t>Quarterly review</a:t></a:r></a:p></p:txBody></p:sp>"#),
        ),
        (
            "ppt/slides/slide2.xml",
            slide(r#"<p:sp><p:txBody><a:p><a:r><a:t>Revenue grew in EMEA</a:t></a:r></a:p></p:txBody></p:sp>"#),
        ),
    ];

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn xlsx() -> Vec<u8> {
    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#,
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Capitals" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
        ),
        (
            "xl/worksheets/sheet1.xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Country</t></is></c><c r="B1" t="inlineStr"><is><t>Capital</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>France</t></is></c><c r="B2" t="inlineStr"><is><t>Paris</t></is></c></row></sheetData></worksheet>"#,
        ),
    ];

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn csv() -> Vec<u8> {
    b"country,capital\nFrance,Paris\nItaly,Rome\n".to_vec()
}

pub fn markdown() -> Vec<u8> {
    b"# Geography\n\nThe capital of France is Paris.\n\n```python\nprint('bonjour')\n```\n".to_vec()
}

pub fn html() -> Vec<u8> {
    br#"<html><head><style>p { color: red; }</style></head><body>
<h1>Geography</h1>
<p>The capital of France is Paris.</p>
<script>var ignored = true;</script>
<table><tr><td>France</td><td>Paris</td></tr></table>
</body></html>"#
        .to_vec()
}

pub fn notebook() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {"kernelspec": {"name": "python3", "language": "python"}},
        "cells": [
            {"cell_type": "markdown", "metadata": {}, "source": ["# Analysis\n", "Paris is the capital of France."]},
            {"cell_type": "code", "metadata": {}, "execution_count": 1, "source": "capital = 'Paris'", "outputs": []},
            {"cell_type": "code", "metadata": {}, "execution_count": null, "source": [], "outputs": []}
        ]
    }))
    .unwrap()
}

pub fn png() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(8, 6, image::Rgb([0, 90, 200]))
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

pub fn jpeg() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(8, 6, image::Rgb([240, 200, 10]))
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

/// One well-formed sample per supported extension
pub fn samples() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("pdf", pdf(&["The capital of France is Paris.", "Rome is in Italy."])),
        ("docx", docx()),
        ("pptx", pptx()),
        ("xlsx", xlsx()),
        ("csv", csv()),
        ("md", markdown()),
        ("ipynb", notebook()),
        ("png", png()),
        ("jpg", jpeg()),
        ("jpeg", jpeg()),
        ("html", html()),
    ]
}
