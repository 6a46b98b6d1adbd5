//! Markup formats: Markdown and HTML

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use scraper::{ElementRef, Html, Selector};

use super::{collapse_whitespace, render_table};
use crate::error::{Error, Result};
use crate::ingestion::RawElement;
use crate::types::ChunkKind;

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

/// Paragraphs, headings, list items and quotes become text; code blocks,
/// tables and images keep their own kinds.
pub fn parse_markdown(data: &[u8]) -> Result<Vec<RawElement>> {
    let source = decode_utf8(data, "md")?;
    let parser = Parser::new_ext(source, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);

    let mut collector = MarkdownCollector::default();
    for event in parser {
        collector.handle(event);
    }
    Ok(collector.elements)
}

#[derive(Default)]
struct MarkdownCollector {
    elements: Vec<RawElement>,
    text: String,
    heading_level: Option<u32>,
    code_language: Option<String>,
    in_code: bool,
    image: Option<(String, String)>,
    table: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    in_table: bool,
}

impl MarkdownCollector {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush_text();
                self.heading_level = Some(level as u32);
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                self.flush_text();
                self.in_code = true;
                self.code_language = match kind {
                    CodeBlockKind::Fenced(lang) => {
                        let lang = lang.split_whitespace().next().unwrap_or("").to_string();
                        (!lang.is_empty()).then_some(lang)
                    }
                    CodeBlockKind::Indented => None,
                };
            }
            Event::Start(Tag::Table(_)) => {
                self.flush_text();
                self.in_table = true;
                self.table.clear();
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                self.image = Some((dest_url.to_string(), String::new()));
            }
            Event::Start(Tag::Item) => self.flush_text(),
            Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Item) => self.flush_text(),
            Event::End(TagEnd::Heading(_)) => {
                self.flush_text();
                self.heading_level = None;
            }
            Event::End(TagEnd::CodeBlock) => {
                let code = std::mem::take(&mut self.text);
                let code = code.trim_end();
                if !code.trim().is_empty() {
                    let mut element = RawElement::code(code);
                    if let Some(lang) = self.code_language.take() {
                        element = element.with_meta("language", lang);
                    }
                    self.elements.push(element);
                }
                self.in_code = false;
                self.code_language = None;
            }
            Event::End(TagEnd::TableCell) => {
                self.row.push(collapse_whitespace(&std::mem::take(&mut self.cell)));
            }
            Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => {
                self.table.push(std::mem::take(&mut self.row));
            }
            Event::End(TagEnd::Table) => {
                let text = render_table(std::mem::take(&mut self.table));
                if !text.is_empty() {
                    self.elements.push(RawElement::table(text));
                }
                self.in_table = false;
            }
            Event::End(TagEnd::Image) => {
                if let Some((src, alt)) = self.image.take() {
                    self.elements.push(
                        RawElement::new(ChunkKind::Image, collapse_whitespace(&alt))
                            .with_meta("src", src),
                    );
                }
            }
            Event::Text(text) | Event::Code(text) => self.push_str(&text),
            Event::SoftBreak | Event::HardBreak => self.push_str(if self.in_code { "\n" } else { " " }),
            _ => {}
        }
    }

    fn push_str(&mut self, text: &str) {
        if let Some((_, alt)) = self.image.as_mut() {
            alt.push_str(text);
        } else if self.in_table {
            self.cell.push_str(text);
        } else {
            self.text.push_str(text);
        }
    }

    fn flush_text(&mut self) {
        if self.in_code {
            return;
        }
        let text = collapse_whitespace(&std::mem::take(&mut self.text));
        if text.is_empty() {
            return;
        }
        let element = match self.heading_level {
            Some(level) => RawElement::text(text)
                .with_meta("element", "heading")
                .with_meta("heading_level", level),
            None => RawElement::text(text),
        };
        self.elements.push(element);
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

/// Layout elements whose loose text becomes its own element
const CONTAINER_TAGS: &[&str] = &[
    "body", "div", "section", "article", "main", "header", "footer", "nav", "aside", "ul", "ol",
    "dl", "figure", "form", "fieldset", "details", "summary", "address",
];

fn block_kind(tag: &str) -> Option<ChunkKind> {
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" | "li" | "blockquote" | "dt" | "dd"
        | "figcaption" => Some(ChunkKind::Text),
        "pre" => Some(ChunkKind::Code),
        "table" => Some(ChunkKind::Table),
        "img" => Some(ChunkKind::Image),
        _ => None,
    }
}

/// Walk the body in document order. Block elements are recorded whole;
/// text sitting directly in layout containers is gathered between blocks.
pub fn parse_html(data: &[u8]) -> Result<Vec<RawElement>> {
    let source = decode_utf8(data, "html")?;
    let document = Html::parse_document(source);
    let body = Selector::parse("body")
        .map_err(|e| Error::internal(format!("Invalid selector: {:?}", e)))?;
    let root = document
        .select(&body)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut walker = HtmlWalker::default();
    let container = root.value().name();
    walker.walk(root, container)?;
    walker.flush(container);
    Ok(walker.elements)
}

#[derive(Default)]
struct HtmlWalker {
    elements: Vec<RawElement>,
    pending: String,
}

impl HtmlWalker {
    fn walk(&mut self, element: ElementRef<'_>, container: &str) -> Result<()> {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                self.pending.push_str(text);
                continue;
            }
            let Some(child) = ElementRef::wrap(child) else {
                continue;
            };
            let tag = child.value().name();
            if SKIPPED_TAGS.contains(&tag) {
                continue;
            }
            if tag == "br" {
                self.pending.push(' ');
            } else if block_kind(tag).is_some() {
                self.flush(container);
                self.record(child)?;
            } else if CONTAINER_TAGS.contains(&tag) {
                self.flush(container);
                self.walk(child, tag)?;
                self.flush(tag);
            } else {
                // Inline markup keeps feeding the enclosing container
                self.walk(child, container)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self, container: &str) {
        let text = collapse_whitespace(&std::mem::take(&mut self.pending));
        if !text.is_empty() {
            self.elements
                .push(RawElement::text(text).with_meta("element", container));
        }
    }

    fn record(&mut self, element: ElementRef<'_>) -> Result<()> {
        let tag = element.value().name();
        let recorded = match block_kind(tag) {
            Some(ChunkKind::Image) => image_element(element),
            Some(ChunkKind::Code) => {
                let text: String = element.text().collect();
                Some(RawElement::code(text.trim_matches('\n').trim_end()))
            }
            Some(ChunkKind::Table) => {
                let rows = Selector::parse("tr")
                    .map_err(|e| Error::internal(format!("Invalid selector: {:?}", e)))?;
                let cells = Selector::parse("th, td")
                    .map_err(|e| Error::internal(format!("Invalid selector: {:?}", e)))?;
                Some(RawElement::table(render_table(element.select(&rows).map(|row| {
                    row.select(&cells)
                        .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
                        .collect::<Vec<_>>()
                }))))
            }
            Some(ChunkKind::Text) => Some(
                RawElement::text(collapse_whitespace(&element.text().collect::<String>()))
                    .with_meta("element", tag),
            ),
            None => None,
        };
        if let Some(recorded) = recorded.filter(|r| !r.is_blank()) {
            self.elements.push(recorded);
        }

        // Pictures inside a text block follow it
        if block_kind(tag) == Some(ChunkKind::Text) {
            let images = element
                .descendent_elements()
                .filter(|e| e.value().name() == "img")
                .filter_map(image_element);
            self.elements.extend(images);
        }
        Ok(())
    }
}

/// Images are only worth indexing when they carry alt text
fn image_element(element: ElementRef<'_>) -> Option<RawElement> {
    let alt = element.value().attr("alt").unwrap_or("").trim();
    if alt.is_empty() {
        return None;
    }
    let src = element.value().attr("src").unwrap_or("");
    Some(RawElement::new(ChunkKind::Image, collapse_whitespace(alt)).with_meta("src", src))
}

fn decode_utf8<'a>(data: &'a [u8], format: &str) -> Result<&'a str> {
    std::str::from_utf8(data)
        .map_err(|e| Error::parse(format, format!("Invalid UTF-8: {}", e)))
}
