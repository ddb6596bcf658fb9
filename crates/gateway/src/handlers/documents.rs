//! Document Lifecycle API handlers (C11)

use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use syllabus_common::auth::AuthContext;
use syllabus_common::db::models::Document;
use syllabus_common::errors::{AppError, Result};
use syllabus_common::validation::{
    validate_content_type, validate_course_code, validate_file_size, validate_filename_raw,
    validate_uuid_field,
};
use uuid::Uuid;

use crate::AppState;

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub course_code: String,
    pub filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub status: String,
    pub uploaded_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            course_code: d.course_code,
            filename: d.filename,
            content_type: d.content_type,
            file_size: d.file_size,
            status: d.status,
            uploaded_by: d.uploaded_by,
            created_at: d.created_at.to_rfc3339(),
            updated_at: d.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
pub struct ListDocumentsQuery {
    pub course_code: String,
}

#[derive(Serialize)]
pub struct DownloadUrlResponse {
    pub download_url: String,
}

/// `POST /documents` — multipart upload. Fields: `course_code`, `file`
/// (with its filename and content type taken from the part).
pub async fn create_document(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    auth.require_can_manage_ingestion()?;

    let mut course_code: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut body: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::DocumentUpload {
            message: format!("invalid multipart body: {e}"),
        })?
    {
        match field.name().unwrap_or_default() {
            "course_code" => {
                course_code = Some(field.text().await.map_err(|e| AppError::DocumentUpload {
                    message: format!("failed to read course_code field: {e}"),
                })?);
            }
            "file" => {
                filename = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                body = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::DocumentUpload {
                            message: format!("failed to read file field: {e}"),
                        })?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let course_code = validate_course_code(&course_code.ok_or_else(|| AppError::MissingField {
        field: "course_code".to_string(),
    })?)?;
    let filename = filename.ok_or_else(|| AppError::MissingField {
        field: "file".to_string(),
    })?;
    validate_filename_raw(&filename)?;
    let content_type = validate_content_type(
        &content_type.ok_or_else(|| AppError::MissingField {
            field: "content_type".to_string(),
        })?,
    )?;
    let body = body.ok_or_else(|| AppError::MissingField {
        field: "file".to_string(),
    })?;
    validate_file_size(body.len() as i64)?;
    if body.len() as u64 > state.config.ingestion.max_file_size_bytes {
        return Err(AppError::PayloadTooLarge {
            size: body.len(),
            limit: state.config.ingestion.max_file_size_bytes as usize,
        });
    }

    state
        .repository
        .find_course(&course_code)
        .await?
        .ok_or_else(|| AppError::CourseNotFound {
            course_code: course_code.clone(),
        })?;

    let document = state
        .document_service
        .create(course_code, filename, body, content_type, auth.subject)
        .await?;

    Ok((StatusCode::CREATED, Json(document.into())))
}

/// `GET /documents?course_code=...`
pub async fn list_documents(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<DocumentResponse>>> {
    let course_code = validate_course_code(&query.course_code)?;
    let documents = state.document_service.list_by_course(&course_code).await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

/// `GET /documents/:document_id`
pub async fn get_document(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentResponse>> {
    let document_id = validate_uuid_field(&document_id, "document_id")?;
    let document = state.document_service.get(document_id).await?;
    Ok(Json(document.into()))
}

/// `DELETE /documents/:document_id`
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<String>,
) -> Result<StatusCode> {
    auth.require_can_manage_ingestion()?;
    let document_id = validate_uuid_field(&document_id, "document_id")?;
    state.document_service.delete(document_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /documents/:document_id/download-url`
pub async fn download_url(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(document_id): Path<String>,
) -> Result<Json<DownloadUrlResponse>> {
    let document_id = validate_uuid_field(&document_id, "document_id")?;
    let ttl = Duration::from_secs(state.config.blob_store.presign_default_ttl_secs);
    let result = state.document_service.download_url(document_id, ttl).await?;
    Ok(Json(DownloadUrlResponse {
        download_url: result.download_url,
    }))
}
