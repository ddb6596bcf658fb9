//! Bit-exact request validation shared by every ingestion-facing handler.
//!
//! These mirror the wire contract in the spec: course codes, document/job
//! ids, and the numeric bounds on retries and chunking parameters.

use crate::errors::{AppError, Result};
use regex_lite::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

fn course_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9-]{2,20}$").unwrap())
}

fn content_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]+/[a-z0-9+.-]+$").unwrap())
}

/// Trim, upper-case, and validate a course code against `^[A-Z0-9-]{2,20}$`.
pub fn validate_course_code(input: &str) -> Result<String> {
    let normalized = input.trim().to_uppercase();
    if !course_code_pattern().is_match(&normalized) {
        return Err(AppError::Validation {
            message: "course_code must be 2-20 characters of [A-Z0-9-]".to_string(),
            field: Some("course_code".to_string()),
        });
    }
    Ok(normalized)
}

/// Lower-case and parse a UUID-shaped identifier (`document_id`/`job_id`).
pub fn validate_uuid_field(input: &str, field: &str) -> Result<Uuid> {
    let normalized = input.trim().to_lowercase();
    Uuid::parse_str(&normalized).map_err(|_| AppError::Validation {
        message: format!("{field} must be a valid UUID"),
        field: Some(field.to_string()),
    })
}

/// `document_ids` length must not exceed this many entries.
pub const MAX_DOCUMENT_IDS: usize = 1000;

/// Validate and parse a SELECTED-mode document id list.
pub fn validate_document_ids(ids: &[String]) -> Result<Vec<Uuid>> {
    if ids.len() > MAX_DOCUMENT_IDS {
        return Err(AppError::Validation {
            message: format!(
                "document_ids cannot contain more than {MAX_DOCUMENT_IDS} entries, got {}",
                ids.len()
            ),
            field: Some("document_ids".to_string()),
        });
    }

    ids.iter()
        .map(|id| validate_uuid_field(id, "document_ids"))
        .collect()
}

/// `max_retries` must be within [0, 10].
pub fn validate_max_retries(value: i32) -> Result<i32> {
    if !(0..=10).contains(&value) {
        return Err(AppError::Validation {
            message: format!("max_retries must be between 0 and 10, got {value}"),
            field: Some("max_retries".to_string()),
        });
    }
    Ok(value)
}

/// `chunk_size > 0`, `chunk_overlap >= 0`, `chunk_overlap < chunk_size`.
pub fn validate_chunk_params(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(AppError::PdfExtraction {
            message: "chunk_size must be positive".to_string(),
        });
    }
    if chunk_overlap >= chunk_size {
        return Err(AppError::PdfExtraction {
            message: format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            ),
        });
    }
    Ok(())
}

/// `filename` must be non-empty and no longer than 255 raw characters.
/// This runs before sanitization, which may further shrink the name.
pub fn validate_filename_raw(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(AppError::Validation {
            message: "filename cannot be empty".to_string(),
            field: Some("filename".to_string()),
        });
    }
    if filename.len() > 255 {
        return Err(AppError::Validation {
            message: "filename cannot exceed 255 characters".to_string(),
            field: Some("filename".to_string()),
        });
    }
    Ok(())
}

/// `file_size` must be positive.
pub fn validate_file_size(file_size: i64) -> Result<()> {
    if file_size <= 0 {
        return Err(AppError::Validation {
            message: "file_size must be positive".to_string(),
            field: Some("file_size".to_string()),
        });
    }
    Ok(())
}

/// Lower-case and validate a content type against `^[a-z]+/[a-z0-9+.-]+$`.
pub fn validate_content_type(content_type: &str) -> Result<String> {
    let normalized = content_type.trim().to_lowercase();
    if !content_type_pattern().is_match(&normalized) {
        return Err(AppError::Validation {
            message: "content_type must look like type/subtype".to_string(),
            field: Some("content_type".to_string()),
        });
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_code_trims_and_upcases() {
        assert_eq!(validate_course_code(" cs101 ").unwrap(), "CS101");
    }

    #[test]
    fn course_code_rejects_bad_charset() {
        assert!(validate_course_code("cs_101").is_err());
    }

    #[test]
    fn course_code_rejects_too_short() {
        assert!(validate_course_code("C").is_err());
    }

    #[test]
    fn uuid_field_lowercases() {
        let id = "3FA85F64-5717-4562-B3FC-2C963F66AFA6";
        let parsed = validate_uuid_field(id, "document_id").unwrap();
        assert_eq!(parsed.to_string(), "3fa85f64-5717-4562-b3fc-2c963f66afa6");
    }

    #[test]
    fn document_ids_exactly_1000_accepted() {
        let ids: Vec<String> = (0..1000).map(|_| Uuid::new_v4().to_string()).collect();
        assert!(validate_document_ids(&ids).is_ok());
    }

    #[test]
    fn document_ids_1001_rejected() {
        let ids: Vec<String> = (0..1001).map(|_| Uuid::new_v4().to_string()).collect();
        assert!(validate_document_ids(&ids).is_err());
    }

    #[test]
    fn max_retries_bounds() {
        assert!(validate_max_retries(0).is_ok());
        assert!(validate_max_retries(10).is_ok());
        assert!(validate_max_retries(-1).is_err());
        assert!(validate_max_retries(11).is_err());
    }

    #[test]
    fn chunk_overlap_equal_size_minus_one_is_legal() {
        assert!(validate_chunk_params(100, 99).is_ok());
    }

    #[test]
    fn chunk_overlap_equal_size_rejected() {
        assert!(validate_chunk_params(100, 100).is_err());
    }

    #[test]
    fn filename_raw_rejects_empty_and_oversized() {
        assert!(validate_filename_raw("").is_err());
        assert!(validate_filename_raw(&"a".repeat(256)).is_err());
        assert!(validate_filename_raw("notes.pdf").is_ok());
    }

    #[test]
    fn file_size_must_be_positive() {
        assert!(validate_file_size(0).is_err());
        assert!(validate_file_size(-1).is_err());
        assert!(validate_file_size(1).is_ok());
    }

    #[test]
    fn content_type_normalizes_and_validates() {
        assert_eq!(
            validate_content_type("APPLICATION/PDF").unwrap(),
            "application/pdf"
        );
        assert!(validate_content_type("not-a-type").is_err());
    }
}
