//! Document lifecycle service (C11)
//!
//! Upload writes a blob then a registry row; if the registry write fails,
//! a compensating blob delete is attempted (best effort — it cannot be
//! made transactional with the blob store). Delete removes the blob and
//! vectors before the registry row, so a crash between steps leaves an
//! observable orphan that a later retry of the delete reconciles, rather
//! than a registry row pointing at nothing.

use crate::blob::BlobStore;
use crate::db::models::{Document, DocumentStatus};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::vector::VectorStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Strip directory components, rewrite unsafe characters, and guard
/// against Windows-reserved stems so the result is safe to use as the
/// tail of a blob key.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    if filename.trim().is_empty() {
        return Err(AppError::DocumentUpload {
            message: "filename cannot be empty".to_string(),
        });
    }

    // Strip any directory components the caller may have sent.
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let mut cleaned: String = base
        .replace('\0', "")
        .replace('/', "_")
        .replace('\\', "_")
        .replace("..", "_")
        .replace(' ', "_");

    cleaned.retain(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if cleaned.is_empty() || cleaned == "." {
        return Err(AppError::DocumentUpload {
            message: "filename is invalid after sanitization".to_string(),
        });
    }

    let (name, ext) = match cleaned.rsplit_once('.') {
        Some((name, ext)) if !name.is_empty() => (name.to_string(), Some(ext.to_string())),
        _ => (cleaned.clone(), None),
    };

    let name = if WINDOWS_RESERVED_NAMES.contains(&name.to_uppercase().as_str()) {
        format!("file_{name}")
    } else {
        name
    };

    let max_name_len = match &ext {
        Some(ext) => 200usize.saturating_sub(ext.len() + 1),
        None => 200,
    };
    let name: String = name.chars().take(max_name_len).collect();

    let sanitized = match ext {
        Some(ext) => format!("{name}.{ext}"),
        None => name,
    };

    if sanitized.is_empty() || sanitized.len() > 255 {
        return Err(AppError::DocumentUpload {
            message: "filename length is invalid after sanitization".to_string(),
        });
    }

    Ok(sanitized)
}

/// Build the blob key a document's content lives under.
pub fn build_blob_key(course_code: &str, document_id: Uuid, sanitized_filename: &str) -> String {
    format!("documents/{course_code}/{document_id}/{sanitized_filename}")
}

/// A document plus a freshly minted download URL.
pub struct DocumentWithDownloadUrl {
    pub document: Document,
    pub download_url: String,
}

/// C11 — document upload, listing, lookup, download, and deletion.
pub struct DocumentService {
    repository: Repository,
    blob_store: Arc<dyn BlobStore>,
    vector_store: Arc<dyn VectorStore>,
}

impl DocumentService {
    pub fn new(
        repository: Repository,
        blob_store: Arc<dyn BlobStore>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            repository,
            blob_store,
            vector_store,
        }
    }

    /// Upload `body` and create the document row. On registry-write
    /// failure, best-effort deletes the blob just written.
    pub async fn create(
        &self,
        course_code: String,
        filename: String,
        body: Vec<u8>,
        content_type: String,
        uploaded_by: String,
    ) -> Result<Document> {
        let document_id = Uuid::new_v4();
        let safe_filename = sanitize_filename(&filename)?;
        let s3_key = build_blob_key(&course_code, document_id, &safe_filename);
        let file_size = body.len() as i64;

        self.blob_store
            .upload(&s3_key, body, &content_type)
            .await
            .map_err(|e| AppError::DocumentUpload {
                message: format!("failed to upload document body: {e}"),
            })?;

        match self
            .repository
            .create_document(
                course_code,
                filename,
                s3_key.clone(),
                content_type,
                file_size,
                uploaded_by,
            )
            .await
        {
            Ok(document) => Ok(document),
            Err(e) => {
                if let Err(cleanup_err) = self.blob_store.delete(&s3_key).await {
                    tracing::error!(
                        s3_key = %s3_key,
                        error = %cleanup_err,
                        "compensating blob delete failed after registry write error"
                    );
                } else {
                    tracing::info!(s3_key = %s3_key, "compensating blob delete succeeded");
                }
                Err(AppError::DocumentUpload {
                    message: format!("failed to save document metadata: {e}"),
                })
            }
        }
    }

    pub async fn list_by_course(&self, course_code: &str) -> Result<Vec<Document>> {
        self.repository.list_documents_by_course(course_code).await
    }

    pub async fn get(&self, document_id: Uuid) -> Result<Document> {
        self.repository
            .find_document_by_id(document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })
    }

    /// Blob -> vectors -> registry row, in that order. A failure before the
    /// registry delete leaves an orphaned row that a retried delete call
    /// will clean up, since every step here is itself idempotent.
    pub async fn delete(&self, document_id: Uuid) -> Result<()> {
        let document = self.get(document_id).await?;

        self.blob_store
            .delete(&document.s3_key)
            .await
            .map_err(|e| AppError::DocumentDelete {
                message: format!("failed to delete document blob: {e}"),
            })?;

        if let Err(e) = self.vector_store.delete_by_document(document_id).await {
            tracing::warn!(
                document_id = %document_id,
                error = %e,
                "vector deletion failed during document delete, proceeding with registry delete"
            );
        }

        self.repository.delete_document(document_id).await
    }

    pub async fn download_url(
        &self,
        document_id: Uuid,
        ttl: Duration,
    ) -> Result<DocumentWithDownloadUrl> {
        let document = self.get(document_id).await?;
        let download_url = self.blob_store.presign_get(&document.s3_key, ttl).await?;
        Ok(DocumentWithDownloadUrl {
            document,
            download_url,
        })
    }

    /// Mark a document's lifecycle status. Exposed for the ingestion
    /// pipeline; the core only ever drives UPLOADED -> INGESTED and
    /// {UPLOADED, INGESTED} -> FAILED.
    pub async fn set_status(&self, document_id: Uuid, status: DocumentStatus) -> Result<()> {
        self.repository
            .update_document_status(document_id, status)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_path_traversal() {
        let result = sanitize_filename("../../etc/passwd").unwrap();
        assert!(!result.contains(".."));
        assert!(!result.contains('/'));
    }

    #[test]
    fn sanitizes_spaces_and_strips_dirs() {
        let result = sanitize_filename("some dir/my notes.pdf").unwrap();
        assert_eq!(result, "my_notes.pdf");
    }

    #[test]
    fn rewrites_windows_reserved_stem() {
        let result = sanitize_filename("CON.txt").unwrap();
        assert_eq!(result, "file_CON.txt");
    }

    #[test]
    fn rejects_empty_filename() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("   ").is_err());
    }

    #[test]
    fn truncates_long_names() {
        let long_name = format!("{}.pdf", "a".repeat(400));
        let result = sanitize_filename(&long_name).unwrap();
        assert!(result.len() <= 255);
        assert!(result.ends_with(".pdf"));
    }

    #[test]
    fn blob_key_has_expected_shape() {
        let id = Uuid::new_v4();
        let key = build_blob_key("CS101", id, "notes.pdf");
        assert_eq!(key, format!("documents/CS101/{id}/notes.pdf"));
    }
}
