//! Job Submission API handlers (C10)
//!
//! Every mutating call here dispatches the orchestrator as a background
//! task (`tokio::spawn`) and returns before the job reaches a terminal
//! state — the HTTP layer never awaits job completion.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use syllabus_common::auth::AuthContext;
use syllabus_common::db::models::{IngestionJob, IngestionMode};
use syllabus_common::errors::{AppError, Result};
use syllabus_common::validation::{
    validate_course_code, validate_document_ids, validate_max_retries, validate_uuid_field,
};
use syllabus_ingestion::orchestrator::{self, ChunkConfig};
use uuid::Uuid;

use crate::AppState;

#[derive(Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub course_code: String,
    pub mode: String,
    pub document_ids: Vec<Uuid>,
    pub status: String,
    pub docs_total: i32,
    pub docs_done: i32,
    pub vectors_created: i32,
    pub progress_percent: f64,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<IngestionJob> for JobResponse {
    fn from(job: IngestionJob) -> Self {
        Self {
            id: job.id,
            course_code: job.course_code.clone(),
            mode: job.mode.clone(),
            document_ids: job.document_ids_vec(),
            status: job.status.clone(),
            docs_total: job.docs_total,
            docs_done: job.docs_done,
            vectors_created: job.vectors_created,
            progress_percent: job.progress_percent(),
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            error_message: job.error_message.clone(),
            created_by: job.created_by.clone(),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Deserialize)]
pub struct StartJobRequest {
    pub course_code: String,
    pub mode: String,
    #[serde(default)]
    pub document_ids: Option<Vec<String>>,
    pub max_retries: Option<i32>,
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub course_code: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    20
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub job_id: String,
}

#[derive(Deserialize)]
pub struct JobIdBody {
    pub job_id: String,
}

fn parse_mode(raw: &str) -> Result<IngestionMode> {
    match raw.to_uppercase().as_str() {
        "NEW" => Ok(IngestionMode::New),
        "SELECTED" => Ok(IngestionMode::Selected),
        "ALL" => Ok(IngestionMode::All),
        "REINGEST" => Ok(IngestionMode::Reingest),
        other => Err(AppError::Validation {
            message: format!("mode must be one of NEW, SELECTED, ALL, REINGEST, got {other}"),
            field: Some("mode".to_string()),
        }),
    }
}

fn dispatch(state: &AppState, job_id: Uuid) {
    let repository = state.repository.clone();
    let blob_store = state.blob_store.clone();
    let vector_store = state.vector_store.clone();
    let embedder = state.embedder.clone();
    let chunk_config = ChunkConfig {
        chunk_size: state.config.ingestion.chunk_size,
        chunk_overlap: state.config.ingestion.chunk_overlap,
    };

    tokio::spawn(async move {
        if let Err(e) = orchestrator::run_job(
            job_id,
            repository,
            blob_store,
            vector_store,
            embedder,
            chunk_config,
        )
        .await
        {
            tracing::error!(job_id = %job_id, error = %e, "orchestrator task exited with an error");
        }
    });
}

/// `POST /ingestions/start`
pub async fn start_job(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<StartJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>)> {
    auth.require_can_manage_ingestion()?;

    let course_code = validate_course_code(&body.course_code)?;
    let mode = parse_mode(&body.mode)?;

    let document_ids = match body.document_ids {
        Some(ids) => validate_document_ids(&ids)?,
        None => Vec::new(),
    };

    if mode == IngestionMode::Selected && document_ids.is_empty() {
        return Err(AppError::IngestionJob {
            message: "SELECTED mode requires a non-empty document_ids list".to_string(),
        });
    }

    let max_retries = validate_max_retries(
        body.max_retries
            .unwrap_or(state.config.ingestion.default_max_retries as i32),
    )?;

    state
        .repository
        .find_course(&course_code)
        .await?
        .ok_or_else(|| AppError::CourseNotFound {
            course_code: course_code.clone(),
        })?;

    let documents = syllabus_ingestion::selector::resolve(
        &state.repository,
        &course_code,
        mode,
        &document_ids,
    )
    .await?;

    let job = state
        .repository
        .create_job(
            course_code,
            mode,
            document_ids,
            documents.len() as i32,
            max_retries,
            auth.subject,
        )
        .await?;

    dispatch(&state, job.id);

    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

/// `GET /ingestions/list?course_code=...`
pub async fn list_jobs(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobResponse>>> {
    let course_code = validate_course_code(&query.course_code)?;
    let (jobs, _total) = state
        .repository
        .list_jobs_by_course(&course_code, query.offset, query.limit)
        .await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

/// `GET /ingestions/status?job_id=...`
pub async fn get_status(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<StatusQuery>,
) -> Result<Json<JobResponse>> {
    let job_id = validate_uuid_field(&query.job_id, "job_id")?;
    let job = state
        .repository
        .find_job_by_id(job_id)
        .await?
        .ok_or_else(|| AppError::IngestionJobNotFound {
            id: job_id.to_string(),
        })?;
    Ok(Json(job.into()))
}

/// `POST /ingestions/cancel`
pub async fn cancel_job(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<JobIdBody>,
) -> Result<Json<JobResponse>> {
    auth.require_can_manage_ingestion()?;
    let job_id = validate_uuid_field(&body.job_id, "job_id")?;
    let job = state.repository.cancel_job(job_id).await?;
    Ok(Json(job.into()))
}

/// `POST /ingestions/retry`
pub async fn retry_job(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<JobIdBody>,
) -> Result<(StatusCode, Json<JobResponse>)> {
    auth.require_can_manage_ingestion()?;
    let job_id = validate_uuid_field(&body.job_id, "job_id")?;
    let job = state.repository.retry_job(job_id).await?;
    syllabus_common::metrics::record_job_retried(&job.course_code);

    dispatch(&state, job.id);

    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

