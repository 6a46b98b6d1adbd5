//! Office Open XML documents: Word (.docx) and PowerPoint (.pptx)

use quick_xml::events::{BytesStart, Event};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};

use super::image::embedded_element;
use super::render_table;
use crate::error::{Error, Result};
use crate::ingestion::{ParseOptions, RawElement};

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive<'a>(data: &'a [u8], format: &str) -> Result<Archive<'a>> {
    zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| Error::parse(format, format!("Not a valid OOXML package: {}", e)))
}

fn read_entry(archive: &mut Archive<'_>, name: &str, format: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| Error::parse(format, format!("{}: {}", name, e)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// DOCX
// ---------------------------------------------------------------------------

/// Paragraphs, tables and embedded pictures of a Word document
///
/// Pictures follow the paragraph or table that draws them. Media the body
/// never references (headers, footers) comes last.
pub fn parse_docx(data: &[u8], options: &ParseOptions) -> Result<Vec<RawElement>> {
    let docx = docx_rs::read_docx(data).map_err(|e| Error::parse("docx", e.to_string()))?;
    let mut archive = open_archive(data, "docx")?;
    let anchors = docx_pictures(&mut archive)?;

    let mut elements = Vec::new();
    let mut placed = HashSet::new();
    let mut block = 0usize;
    for child in docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => {
                let text = paragraph_text(&p);
                if !text.trim().is_empty() {
                    let mut element = RawElement::text(text.trim());
                    if let Some(style) = &p.property.style {
                        element = element.with_meta("style", style.val.clone());
                    }
                    elements.push(element);
                }
            }
            docx_rs::DocumentChild::Table(table) => {
                let text = render_table(table_rows(&table));
                if !text.is_empty() {
                    elements.push(RawElement::table(text));
                }
            }
            _ => continue,
        }

        for anchor in anchors.iter().filter(|a| a.block == block) {
            if placed.insert(anchor.path.clone()) {
                push_picture(&mut archive, &anchor.path, &anchor.description, options, &mut elements);
            }
        }
        block += 1;
    }

    let mut media: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("word/media/") && !placed.contains(*name))
        .map(|s| s.to_string())
        .collect();
    media.sort_by_key(|name| natural_key(name));
    for name in media {
        push_picture(&mut archive, &name, "", options, &mut elements);
    }

    Ok(elements)
}

fn push_picture(
    archive: &mut Archive<'_>,
    path: &str,
    description: &str,
    options: &ParseOptions,
    elements: &mut Vec<RawElement>,
) {
    let Ok(bytes) = read_entry(archive, path, "docx") else {
        tracing::debug!("Missing document media {}", path);
        return;
    };
    if let Some(element) = embedded_element(&bytes, description, options) {
        elements.push(element.with_meta("src", path));
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DrawingAnchor {
    /// Index among the body's paragraphs and tables
    block: usize,
    rel_id: String,
    description: String,
}

#[derive(Debug)]
struct PlacedPicture {
    block: usize,
    path: String,
    description: String,
}

fn docx_pictures(archive: &mut Archive<'_>) -> Result<Vec<PlacedPicture>> {
    let Ok(xml) = read_entry(archive, "word/document.xml", "docx") else {
        return Ok(Vec::new());
    };
    let anchors = drawing_anchors(&String::from_utf8_lossy(&xml))?;
    if anchors.is_empty() {
        return Ok(Vec::new());
    }

    let rels = match read_entry(archive, "word/_rels/document.xml.rels", "docx") {
        Ok(bytes) => parse_relationships(&String::from_utf8_lossy(&bytes), "docx")?,
        Err(_) => {
            tracing::debug!("Document has drawings but no relationships file");
            HashMap::new()
        }
    };

    Ok(anchors
        .into_iter()
        .filter_map(|anchor| {
            let target = rels.get(&anchor.rel_id)?;
            Some(PlacedPicture {
                block: anchor.block,
                path: resolve_target("word", target),
                description: anchor.description,
            })
        })
        .collect())
}

/// Blip references in `word/document.xml`, tagged with the body block that holds them
fn drawing_anchors(xml: &str) -> Result<Vec<DrawingAnchor>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut anchors = Vec::new();

    let mut depth = 0usize;
    let mut body_depth: Option<usize> = None;
    let mut blocks = 0usize;
    let mut current: Option<usize> = None;
    let mut description = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::parse("docx", format!("Malformed document XML: {}", e)))?;
        let (e, is_empty) = match event {
            Event::Start(e) => {
                depth += 1;
                (e, false)
            }
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                if body_depth == Some(depth) && e.local_name().as_ref() == b"body" {
                    body_depth = None;
                }
                depth = depth.saturating_sub(1);
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        // Depth the element sits at, whether or not it has children
        let level = if is_empty { depth + 1 } else { depth };
        match e.local_name().as_ref() {
            b"body" if !is_empty => body_depth = Some(depth),
            b"p" | b"tbl" if body_depth.map_or(false, |d| level == d + 1) => {
                current = Some(blocks);
                blocks += 1;
            }
            b"docPr" => {
                description = attribute(&e, b"descr").unwrap_or_default();
            }
            b"blip" => {
                if let (Some(block), Some(rel_id)) = (current, attribute(&e, b"embed")) {
                    anchors.push(DrawingAnchor {
                        block,
                        rel_id,
                        description: std::mem::take(&mut description),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(anchors)
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Sort key that puts image2 before image10
fn natural_key(name: &str) -> (String, u64, String) {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    let prefix = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    let number = stem[prefix.len()..].parse().unwrap_or(0);
    (prefix.to_string(), number, name.to_string())
}

fn paragraph_text(p: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for child in &run.children {
                match child {
                    docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                    docx_rs::RunChild::Tab(_) => text.push('\t'),
                    docx_rs::RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
    }
    text
}

#[allow(irrefutable_let_patterns)]
fn table_rows(table: &docx_rs::Table) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(row) = row else {
            continue;
        };
        let mut cells = Vec::new();
        for cell in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = cell else {
                continue;
            };
            let text = cell
                .children
                .iter()
                .filter_map(|content| match content {
                    docx_rs::TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                    _ => None,
                })
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            cells.push(text);
        }
        rows.push(cells);
    }
    rows
}

// ---------------------------------------------------------------------------
// PPTX
// ---------------------------------------------------------------------------

/// One text element per slide plus its tables and pictures, positioned by slide
pub fn parse_pptx(data: &[u8], options: &ParseOptions) -> Result<Vec<RawElement>> {
    let mut archive = open_archive(data, "pptx")?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort();

    if slides.is_empty() {
        return Err(Error::parse("pptx", "Presentation contains no slides"));
    }

    let mut elements = Vec::new();
    for (index, (number, name)) in slides.iter().enumerate() {
        let slide_number = index as u32 + 1;
        let xml = String::from_utf8_lossy(&read_entry(&mut archive, name, "pptx")?).into_owned();
        let slide = SlideContent::parse(&xml)?;

        let text = slide.paragraphs.join("\n");
        if !text.trim().is_empty() {
            elements.push(
                RawElement::text(text)
                    .at(slide_number)
                    .with_meta("slide", slide_number),
            );
        }

        for table in &slide.tables {
            let text = render_table(table);
            if !text.is_empty() {
                elements.push(
                    RawElement::table(text)
                        .at(slide_number)
                        .with_meta("slide", slide_number),
                );
            }
        }

        if slide.pictures.is_empty() {
            continue;
        }

        let rels_name = format!("ppt/slides/_rels/slide{}.xml.rels", number);
        let rels = match read_entry(&mut archive, &rels_name, "pptx") {
            Ok(bytes) => parse_relationships(&String::from_utf8_lossy(&bytes), "pptx")?,
            Err(_) => {
                tracing::debug!("Slide {} has pictures but no relationships file", number);
                HashMap::new()
            }
        };

        for picture in &slide.pictures {
            let Some(target) = rels.get(&picture.rel_id) else {
                continue;
            };
            let path = resolve_target("ppt/slides", target);
            let Ok(bytes) = read_entry(&mut archive, &path, "pptx") else {
                tracing::debug!("Missing slide media {}", path);
                continue;
            };
            if let Some(element) = embedded_element(&bytes, &picture.description, options) {
                elements.push(
                    element
                        .at(slide_number)
                        .with_meta("slide", slide_number)
                        .with_meta("src", path),
                );
            }
        }
    }

    Ok(elements)
}

#[derive(Debug, Default)]
struct Picture {
    rel_id: String,
    description: String,
}

#[derive(Debug, Default)]
struct SlideContent {
    paragraphs: Vec<String>,
    tables: Vec<Vec<Vec<String>>>,
    pictures: Vec<Picture>,
}

impl SlideContent {
    fn parse(xml: &str) -> Result<Self> {
        let mut reader = quick_xml::Reader::from_str(xml);
        let mut slide = SlideContent::default();

        let mut in_text = false;
        let mut paragraph = String::new();
        let mut table: Option<Vec<Vec<String>>> = None;
        let mut row: Vec<String> = Vec::new();
        let mut cell = String::new();
        let mut picture: Option<Picture> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| Error::parse("pptx", format!("Malformed slide XML: {}", e)))?;
            match event {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"t" => in_text = true,
                    b"tbl" => table = Some(Vec::new()),
                    b"tr" => row.clear(),
                    b"tc" => cell.clear(),
                    b"pic" => picture = Some(Picture::default()),
                    _ => Self::picture_attributes(&e, picture.as_mut()),
                },
                Event::Empty(e) => Self::picture_attributes(&e, picture.as_mut()),
                Event::Text(e) if in_text => {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::parse("pptx", e.to_string()))?;
                    paragraph.push_str(&text);
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"p" => {
                        let text = paragraph.trim().to_string();
                        paragraph.clear();
                        if text.is_empty() {
                            continue;
                        }
                        if table.is_some() {
                            if !cell.is_empty() {
                                cell.push(' ');
                            }
                            cell.push_str(&text);
                        } else {
                            slide.paragraphs.push(text);
                        }
                    }
                    b"tc" => row.push(std::mem::take(&mut cell)),
                    b"tr" => {
                        if let Some(table) = table.as_mut() {
                            table.push(std::mem::take(&mut row));
                        }
                    }
                    b"tbl" => {
                        if let Some(table) = table.take() {
                            slide.tables.push(table);
                        }
                    }
                    b"pic" => {
                        if let Some(picture) = picture.take() {
                            if !picture.rel_id.is_empty() {
                                slide.pictures.push(picture);
                            }
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(slide)
    }

    fn picture_attributes(e: &BytesStart<'_>, picture: Option<&mut Picture>) {
        let Some(picture) = picture else {
            return;
        };
        let wanted: &[u8] = match e.local_name().as_ref() {
            b"cNvPr" => b"descr",
            b"blip" => b"embed",
            _ => return,
        };
        for attr in e.attributes().flatten() {
            if attr.key.local_name().as_ref() != wanted {
                continue;
            }
            let Ok(value) = attr.unescape_value() else {
                continue;
            };
            if wanted == b"descr" {
                picture.description = value.into_owned();
            } else {
                picture.rel_id = value.into_owned();
            }
        }
    }
}

/// Relationship id → target from a `.rels` part
fn parse_relationships(xml: &str, format: &str) -> Result<HashMap<String, String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut rels = HashMap::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| Error::parse(format, format!("Malformed relationships: {}", e)))?
        {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_default();
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rels)
}

/// Resolve a relationship target relative to the part's directory
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            ".." => {
                parts.pop();
            }
            "." | "" => {}
            other => parts.push(other),
        }
    }
    parts.join("/")
}
