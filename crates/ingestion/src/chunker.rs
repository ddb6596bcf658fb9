//! Text chunking
//!
//! Fixed-size sliding window over characters, no sentence-boundary
//! snapping. `start` advances by `chunk_size - chunk_overlap` each step,
//! matching the window the rest of the pipeline expects chunk indices to
//! line up with.

use syllabus_common::errors::Result;
use syllabus_common::validation::validate_chunk_params;
use tracing::debug;

/// Split `text` into a sequence of overlapping fixed-size chunks.
/// Empty input returns an empty vector, not an error.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    validate_chunk_params(chunk_size, chunk_overlap)?;

    let chars: Vec<char> = text.chars().collect();
    let total_len = chars.len();

    if total_len == 0 {
        return Ok(Vec::new());
    }

    let advance = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total_len {
        let end = (start + chunk_size).min(total_len);
        let chunk: String = chars[start..end].iter().collect();
        chunks.push(chunk);

        if end >= total_len {
            break;
        }

        start += advance;
    }

    debug!(
        input_len = total_len,
        chunk_count = chunks.len(),
        chunk_size,
        chunk_overlap,
        "text chunked"
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_returns_empty() {
        let chunks = chunk_text("", 100, 20).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn single_chunk_when_text_shorter_than_size() {
        let chunks = chunk_text("short text", 100, 20).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "short text");
    }

    #[test]
    fn sliding_window_overlaps_as_expected() {
        let text = "0123456789".repeat(10); // 100 chars
        let chunks = chunk_text(&text, 30, 10).unwrap();
        // advance = 20 per step; last window covers [80,100)
        assert!(chunks.len() >= 4);
        for w in chunks.windows(2) {
            let tail = &w[0][w[0].len() - 10..];
            assert!(w[1].starts_with(tail));
        }
    }

    #[test]
    fn zero_overlap_has_no_repeated_content() {
        let text = "a".repeat(50);
        let chunks = chunk_text(&text, 10, 0).unwrap();
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(chunk_text("hello", 0, 0).is_err());
    }

    #[test]
    fn rejects_overlap_equal_to_size() {
        assert!(chunk_text("hello world", 10, 10).is_err());
    }

    #[test]
    fn overlap_equal_to_size_minus_one_is_legal() {
        assert!(chunk_text("hello world", 10, 9).is_ok());
    }
}
