//! Job Selector (C7)
//!
//! Translates a job's `(mode, document_ids)` into a concrete, ordered
//! document set. Re-run at claim time rather than cached, so a retried
//! REINGEST job picks up documents that finished ingesting since its
//! original selection.

use syllabus_common::db::models::{Document, DocumentStatus, IngestionMode};
use syllabus_common::errors::{AppError, Result};
use syllabus_common::Repository;

/// Resolve the document set for `(course_code, mode, document_ids)`.
pub async fn resolve(
    repository: &Repository,
    course_code: &str,
    mode: IngestionMode,
    document_ids: &[uuid::Uuid],
) -> Result<Vec<Document>> {
    match mode {
        IngestionMode::New => {
            repository
                .find_documents_by_course_and_statuses(
                    course_code,
                    Some(&[DocumentStatus::Uploaded]),
                )
                .await
        }
        IngestionMode::Selected => {
            if document_ids.is_empty() {
                return Err(AppError::IngestionJob {
                    message: "SELECTED mode requires a non-empty document_ids list".to_string(),
                });
            }
            repository
                .find_documents_by_ids(course_code, document_ids)
                .await
        }
        IngestionMode::All => {
            repository
                .find_documents_by_course_and_statuses(course_code, None)
                .await
        }
        IngestionMode::Reingest => {
            repository
                .find_documents_by_course_and_statuses(
                    course_code,
                    Some(&[DocumentStatus::Ingested]),
                )
                .await
        }
    }
}
