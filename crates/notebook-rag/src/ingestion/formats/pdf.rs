//! PDF extraction: lopdf page by page with image XObjects, pdf-extract as
//! whole-document fallback

use ::image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::image;
use crate::error::{Error, Result};
use crate::ingestion::{ParseOptions, RawElement};
use crate::types::ChunkKind;

/// Glyph names that leak into extracted text, with their plain replacements
const GLYPH_REPLACEMENTS: &[(&str, &str)] = &[
    ("uni2010", "-"),
    ("uni2011", "-"),
    ("uni2012", "-"),
    ("uni2013", "-"),
    ("uni2014", "--"),
    ("uni2015", "--"),
    ("uni2018", "'"),
    ("uni2019", "'"),
    ("uni201A", ","),
    ("uni201C", "\""),
    ("uni201D", "\""),
    ("uni201E", "\""),
    ("uni2022", "* "),
    ("uni2026", "..."),
    ("uni00A0", " "),
    ("uni2002", " "),
    ("uni2003", " "),
    ("uni2009", " "),
    ("uni2212", "-"),
    ("uni00D7", "x"),
    ("uni20AC", "EUR"),
    ("uni00A9", "(c)"),
    ("uni00AE", "(R)"),
    ("uni2122", "(TM)"),
    ("(f_f_i)", "ffi"),
    ("(f_f_l)", "ffl"),
    ("(f_i)", "fi"),
    ("(f_l)", "fl"),
    ("(f_f)", "ff"),
];

/// Unicode characters folded to ASCII
const CHAR_REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2022}', "* "),
    ('\u{2026}', "..."),
    ('\u{00A0}', " "),
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\0', ""),
];

/// Replace leaked glyph names and ligatures, drop blank lines
pub fn cleanup_text(text: &str) -> String {
    let mut result = text.to_string();
    for (glyph, replacement) in GLYPH_REPLACEMENTS {
        if result.contains(glyph) {
            result = result.replace(glyph, replacement);
        }
    }
    for (ch, replacement) in CHAR_REPLACEMENTS {
        if result.contains(*ch) {
            result = result.replace(*ch, replacement);
        }
    }
    result
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One text element per non-empty page plus its decodable images, all
/// positioned by page number
pub fn parse(data: &[u8], options: &ParseOptions) -> Result<Vec<RawElement>> {
    let doc = match Document::load_mem(data) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("lopdf could not load PDF ({}), trying pdf-extract", e);
            return whole_document(data);
        }
    };
    if doc.is_encrypted() {
        tracing::warn!("PDF is encrypted, page text may be unavailable");
    }

    let mut elements = match extract_pages(&doc, options) {
        Ok(elements) => elements,
        Err(e) => {
            // Never a partial page set
            tracing::warn!("Page-wise extraction failed ({}), trying pdf-extract", e);
            return whole_document(data);
        }
    };

    if !elements.iter().any(|e| e.kind == ChunkKind::Text) {
        match extract_whole_document(data) {
            Ok(text) => {
                elements.extend(text);
                elements.sort_by_key(|e| e.position);
            }
            Err(e) => tracing::debug!("pdf-extract found no text layer either: {}", e),
        }
    }

    if elements.is_empty() {
        return Err(no_content());
    }
    Ok(elements)
}

fn no_content() -> Error {
    Error::parse(
        "pdf",
        "No text content could be extracted; the PDF may be image-based or encrypted",
    )
}

fn whole_document(data: &[u8]) -> Result<Vec<RawElement>> {
    let elements = extract_whole_document(data)?;
    if elements.is_empty() {
        return Err(no_content());
    }
    Ok(elements)
}

fn extract_pages(
    doc: &Document,
    options: &ParseOptions,
) -> std::result::Result<Vec<RawElement>, String> {
    assemble_pages(doc.get_pages().into_iter().map(|(number, page_id)| {
        let text = doc.extract_text(&[number]).map_err(|e| e.to_string());
        let images = if text.is_ok() {
            page_images(doc, page_id, options)
        } else {
            Vec::new()
        };
        (number, text, images)
    }))
}

/// Join per-page results in page order; any failed page fails the whole pass
fn assemble_pages<I>(pages: I) -> std::result::Result<Vec<RawElement>, String>
where
    I: IntoIterator<Item = (u32, std::result::Result<String, String>, Vec<RawElement>)>,
{
    let mut elements = Vec::new();
    for (number, text, images) in pages {
        let text = text.map_err(|e| format!("page {}: {}", number, e))?;
        let text = cleanup_text(&text);
        if !text.is_empty() {
            elements.push(RawElement::text(text).at(number));
        }
        elements.extend(images.into_iter().map(|image| image.at(number)));
    }
    Ok(elements)
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Resources of a page, inherited from its ancestors when absent
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    // Bounded walk; malformed files can loop their Parent links
    for _ in 0..64 {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(doc, resources)?.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Image XObjects drawn from the page resources, in resource order
fn page_images(doc: &Document, page_id: ObjectId, options: &ParseOptions) -> Vec<RawElement> {
    let Some(xobjects) = page_resources(doc, page_id)
        .and_then(|resources| resources.get(b"XObject").ok())
        .and_then(|object| resolve(doc, object))
        .and_then(|object| object.as_dict().ok())
    else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for (name, object) in xobjects.iter() {
        let Some(stream) = resolve(doc, object).and_then(|o| o.as_stream().ok()) else {
            continue;
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map_or(false, |subtype| subtype == b"Image");
        if !is_image {
            continue;
        }

        let name = String::from_utf8_lossy(name).into_owned();
        let element = match stream_filters(stream).as_slice() {
            [filter] if filter.as_slice() == b"DCTDecode" => {
                image::embedded_element(&stream.content, "", options)
            }
            [] => raw_pixels(stream, stream.content.clone(), options),
            [filter] if filter.as_slice() == b"FlateDecode" => match stream.decompressed_content() {
                Ok(data) => raw_pixels(stream, data, options),
                Err(e) => {
                    tracing::debug!("Cannot inflate image {}: {}", name, e);
                    None
                }
            },
            other => {
                tracing::debug!("Skipping image {} with filters {:?}", name, other);
                None
            }
        };
        if let Some(element) = element {
            images.push(element.with_meta("xobject", name));
        }
    }
    images
}

fn stream_filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(filters)) => filters
            .iter()
            .filter_map(|f| f.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// 8-bit RGB or gray samples; other color spaces are skipped
fn raw_pixels(stream: &Stream, data: Vec<u8>, options: &ParseOptions) -> Option<RawElement> {
    let dimension = |key: &[u8]| {
        stream
            .dict
            .get(key)
            .and_then(Object::as_i64)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
    };
    let (width, height) = (dimension(b"Width")?, dimension(b"Height")?);
    if dimension(b"BitsPerComponent") != Some(8) {
        return None;
    }
    let color_space = stream.dict.get(b"ColorSpace").and_then(Object::as_name).ok()?;

    let pixels = width as usize * height as usize;
    let decoded = match color_space {
        b"DeviceRGB" => {
            let data = data.get(..pixels * 3)?.to_vec();
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, data)?)
        }
        b"DeviceGray" => {
            let data = data.get(..pixels)?.to_vec();
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, data)?)
        }
        _ => return None,
    };

    match image::encode_decoded(&decoded, options.jpeg_quality) {
        Ok(payload) => Some(RawElement::image("", payload)),
        Err(e) => {
            tracing::warn!("Skipping embedded image: {}", e);
            None
        }
    }
}

/// pdf-extract separates pages with form feeds; without them the text is page 1
fn extract_whole_document(data: &[u8]) -> Result<Vec<RawElement>> {
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(data))
        .map_err(|_| Error::parse("pdf", "pdf-extract panicked while reading the document"))?
        .map_err(|e| Error::parse("pdf", e.to_string()))?;

    Ok(extracted
        .split('\u{000C}')
        .enumerate()
        .filter_map(|(idx, page)| {
            let text = cleanup_text(page);
            (!text.is_empty()).then(|| RawElement::text(text).at(idx as u32 + 1))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use crate::types::chunk::IMAGE_PAYLOAD_KEY;
    use lopdf::dictionary;

    fn build_pdf(pages: &[&str]) -> Vec<u8> {
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
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
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

    #[test]
    fn test_pages_keep_native_numbers() {
        let data = build_pdf(&["Revenue grew in Q3", "Costs were flat"]);
        let elements = parse(&data, &ParseOptions::default()).unwrap();

        assert_eq!(elements.len(), 2);
        assert!(elements[0].text.contains("Revenue grew"));
        assert_eq!(elements[0].position, Some(1));
        assert!(elements[1].text.contains("Costs were flat"));
        assert_eq!(elements[1].position, Some(2));
    }

    #[test]
    fn test_garbage_is_parse_failure() {
        let err = parse(b"%PDF-1.4 definitely not a pdf", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ParseFailure { .. }));
    }

    fn build_pdf_with_images() -> Vec<u8> {
        let mut jpeg = std::io::Cursor::new(Vec::new());
        RgbImage::from_pixel(8, 6, ::image::Rgb([30, 120, 220]))
            .write_to(&mut jpeg, ::image::ImageFormat::Jpeg)
            .unwrap();

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let photo_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 8,
                "Height" => 6,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg.into_inner(),
        ));
        let mask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0, 255, 255, 0],
        ));

        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal("Figure 1 shows the coast")]),
                Operation::new("ET", vec![]),
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![80.into(), 0.into(), 0.into(), 60.into(), 72.into(), 500.into()],
                ),
                Operation::new("Do", vec!["Im1".into()]),
                Operation::new("Do", vec!["Im2".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => dictionary! { "Im1" => photo_id, "Im2" => mask_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
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

    #[test]
    fn test_page_images_follow_page_text() {
        let elements = parse(&build_pdf_with_images(), &ParseOptions::default()).unwrap();

        let kinds: Vec<ChunkKind> = elements.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChunkKind::Text, ChunkKind::Image, ChunkKind::Image]);
        assert!(elements[0].text.contains("Figure 1"));
        assert!(elements.iter().all(|e| e.position == Some(1)));

        assert_eq!(elements[1].metadata["xobject"], "Im1");
        assert_eq!(elements[1].metadata["width"], 8);
        assert!(elements[1].metadata.contains_key(IMAGE_PAYLOAD_KEY));
        assert_eq!(elements[2].metadata["xobject"], "Im2");
        assert_eq!(elements[2].metadata["height"], 2);
    }

    #[test]
    fn test_failed_page_fails_the_page_pass() {
        let pages = vec![
            (1, Ok("Alpha".to_string()), Vec::new()),
            (2, Err("invalid content stream".to_string()), Vec::new()),
            (3, Ok("Gamma".to_string()), Vec::new()),
        ];
        let err = assemble_pages(pages).unwrap_err();
        assert!(err.starts_with("page 2:"));

        let pages = vec![
            (1, Ok("Alpha".to_string()), Vec::new()),
            (3, Ok("  \n".to_string()), Vec::new()),
            (4, Ok("Delta".to_string()), Vec::new()),
        ];
        let elements = assemble_pages(pages).unwrap();
        let positions: Vec<Option<u32>> = elements.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![Some(1), Some(4)]);
    }

    #[test]
    fn test_cleanup_text() {
        assert_eq!(
            cleanup_text("  e\u{FB03}cient uni2014 done \n\n\u{201C}q\u{201D}  "),
            "efficient -- done\n\"q\""
        );
    }
}
