//! PDF text extraction
//!
//! Extracts text content from uploaded PDF bytes using lopdf. Literal string
//! operators are read straight from each page's content stream; pages that
//! yield nothing that way go through lopdf's font-aware extractor.

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("No text content extracted from PDF")]
    NoText,
}

/// Extract text content from an in-memory PDF
pub fn extract_text(bytes: &[u8]) -> Result<String, PdfError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| PdfError::Load(e.to_string()))?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for (page_num, page_id) in pages {
        let page_text = match doc.get_page_content(page_id) {
            Ok(content) => extract_text_from_content(&content),
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to read page content");
                String::new()
            }
        };

        let page_text = if page_text.trim().is_empty() {
            doc.extract_text(&[page_num]).unwrap_or_default()
        } else {
            page_text
        };

        text.push_str(&page_text);
        text.push('\n');
    }

    let cleaned = clean_text(&text);
    if cleaned.is_empty() {
        return Err(PdfError::NoText);
    }

    debug!(
        original_len = text.len(),
        cleaned_len = cleaned.len(),
        "Text extraction complete"
    );
    Ok(cleaned)
}

/// Collect text shown between BT and ET operators
fn extract_text_from_content(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;

    for line in content_str.lines() {
        match line.trim() {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                text.push(' ');
            }
            op if in_text_block => {
                if let Some(shown) = shown_text(op) {
                    text.push_str(&shown);
                }
            }
            _ => {}
        }
    }

    text
}

/// Text shown by a `Tj`, `'`, `"` or `TJ` operator line
fn shown_text(line: &str) -> Option<String> {
    if line.ends_with("Tj") || line.ends_with('\'') || line.ends_with('"') {
        let start = line.find('(')?;
        let end = line.rfind(')')?;
        return (end > start).then(|| decode_pdf_string(&line[start + 1..end]));
    }

    if line.ends_with("TJ") {
        let mut result = String::new();
        let mut current = String::new();
        let mut in_paren = false;
        let mut escaped = false;

        for ch in line.chars() {
            match ch {
                _ if escaped => {
                    current.push(ch);
                    escaped = false;
                }
                '\\' if in_paren => {
                    current.push(ch);
                    escaped = true;
                }
                '(' if !in_paren => in_paren = true,
                ')' if in_paren => {
                    in_paren = false;
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                }
                _ if in_paren => current.push(ch),
                _ => {}
            }
        }

        return (!result.is_empty()).then_some(result);
    }

    None
}

/// Decode PDF string escapes
fn decode_pdf_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some(c) => result.push(c),
            None => {}
        }
    }

    result
}

/// Collapse whitespace and normalize typographic quotes
fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    fn one_page_pdf(line: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_extracts_page_text() {
        let bytes = one_page_pdf("Attention Is All You Need");
        let text = extract_text(&bytes).unwrap();
        assert!(text.contains("Attention Is All You Need"), "{}", text);
    }

    #[test]
    fn test_rejects_non_pdf() {
        assert!(matches!(
            extract_text(b"definitely not a pdf"),
            Err(PdfError::Load(_))
        ));
    }

    #[test]
    fn test_tj_array() {
        assert_eq!(
            shown_text("[(Hel) -20 (lo\\)) 10 (!)] TJ").as_deref(),
            Some("Hello)!")
        );
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("Hello   World\n\nTest"), "Hello World Test");
        assert_eq!(clean_text("\u{201C}quoted\u{201D}"), "\"quoted\"");
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_pdf_string("Test\\(paren\\)"), "Test(paren)");
    }
}
