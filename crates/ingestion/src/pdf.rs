//! PDF text extraction
//!
//! Extracts text content from in-memory PDF bytes using lopdf, then
//! chunks it. Document bytes come from the blob store, never from local
//! disk, so extraction works off a byte slice rather than a path.

use crate::chunker::chunk_text;
use syllabus_common::errors::{AppError, Result};
use tracing::{debug, warn};

/// Extract text from `bytes` and split it into fixed-size overlapping
/// chunks in one step.
pub fn extract_and_chunk(
    bytes: &[u8],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>> {
    let text = extract_text_from_pdf(bytes)?;
    chunk_text(&text, chunk_size, chunk_overlap)
}

/// Extract and clean all text content from a PDF held in memory.
pub fn extract_text_from_pdf(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| AppError::PdfExtraction {
        message: format!("failed to load PDF: {e}"),
    })?;

    let mut text = String::new();
    let pages = doc.get_pages();

    debug!(page_count = pages.len(), "extracting text from PDF");

    for (page_num, _) in pages.iter() {
        match extract_page_text(&doc, *page_num) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "failed to extract text from page, skipping");
            }
        }
    }

    let cleaned = clean_text(&text);

    debug!(
        original_len = text.len(),
        cleaned_len = cleaned.len(),
        "text extraction complete"
    );

    Ok(cleaned)
}

fn extract_page_text(doc: &lopdf::Document, page_num: u32) -> Result<String> {
    let page_id = doc
        .page_iter()
        .nth((page_num - 1) as usize)
        .ok_or_else(|| AppError::PdfExtraction {
            message: format!("page {page_num} not found"),
        })?;

    let content = doc
        .get_page_content(page_id)
        .map_err(|e| AppError::PdfExtraction {
            message: e.to_string(),
        })?;

    Ok(extract_text_from_content(&content))
}

/// Walk a content stream line by line, collecting text between BT/ET
/// operators. Not a full PDF content-stream parser: it handles the Tj/TJ
/// text-showing operators used by the vast majority of generated PDFs.
fn extract_text_from_content(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current_text = String::new();

    for line in content_str.lines() {
        let trimmed = line.trim();

        if trimmed == "BT" {
            in_text_block = true;
            continue;
        }

        if trimmed == "ET" {
            in_text_block = false;
            if !current_text.is_empty() {
                text.push_str(&current_text);
                text.push(' ');
                current_text.clear();
            }
            continue;
        }

        if in_text_block {
            if let Some(text_content) = extract_text_from_operator(trimmed) {
                current_text.push_str(&text_content);
            }
        }
    }

    text
}

fn extract_text_from_operator(line: &str) -> Option<String> {
    if line.ends_with("Tj") || line.ends_with('\'') || line.ends_with('"') {
        if let Some(start) = line.find('(') {
            if let Some(end) = line.rfind(')') {
                let text = &line[start + 1..end];
                return Some(decode_pdf_string(text));
            }
        }
    }

    if line.ends_with("TJ") {
        let mut result = String::new();
        let mut in_paren = false;
        let mut current = String::new();

        for ch in line.chars() {
            match ch {
                '(' => {
                    in_paren = true;
                }
                ')' => {
                    in_paren = false;
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                }
                _ if in_paren => {
                    current.push(ch);
                }
                _ => {}
            }
        }

        if !result.is_empty() {
            return Some(result);
        }
    }

    None
}

fn decode_pdf_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('(') => result.push('('),
                Some(')') => result.push(')'),
                Some(c) => result.push(c),
                None => {}
            }
        } else {
            result.push(ch);
        }
    }

    result
}

fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{FEFF}', "")
        .replace('\u{201C}', "\"")
        .replace('\u{201D}', "\"")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_whitespace() {
        let input = "Hello   World\n\nTest";
        assert_eq!(clean_text(input), "Hello World Test");
    }

    #[test]
    fn normalizes_smart_quotes() {
        let input = "\u{201C}quoted\u{201D} and \u{2018}single\u{2019}";
        assert_eq!(clean_text(input), "\"quoted\" and 'single'");
    }

    #[test]
    fn decodes_escape_sequences() {
        assert_eq!(decode_pdf_string("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_pdf_string("Test\\(paren\\)"), "Test(paren)");
    }

    #[test]
    fn rejects_garbage_bytes() {
        let result = extract_text_from_pdf(b"not a pdf at all");
        assert!(result.is_err());
    }

    #[test]
    fn extracts_text_from_a_real_page() {
        let bytes = crate::test_support::minimal_pdf(Some("Hello World"));
        let text = extract_text_from_pdf(&bytes).unwrap();
        assert!(text.contains("Hello World"), "got: {text:?}");
    }

    #[test]
    fn empty_content_stream_is_not_an_error() {
        // A page with no text-showing operators (e.g. a scanned, unOCR'd
        // page) yields empty extracted text, not `PdfExtractionError` —
        // the pipeline treats that as zero chunks, not a failure.
        let bytes = crate::test_support::minimal_pdf(None);
        let text = extract_text_from_pdf(&bytes).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn extract_and_chunk_on_empty_pdf_yields_zero_chunks() {
        let bytes = crate::test_support::minimal_pdf(None);
        let chunks = extract_and_chunk(&bytes, 100, 10).unwrap();
        assert!(chunks.is_empty());
    }
}
