//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations, with the
//! job-state transitions (`claim_job`/`cancel_job`/`retry_job`) implemented as
//! single conditional `UPDATE` statements so the database enforces the job
//! engine's state machine even under concurrent callers.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, Statement,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Course Operations
    // ========================================================================

    /// Look up a course by code. Course catalog management lives elsewhere;
    /// this is only an existence check.
    pub async fn find_course(&self, course_code: &str) -> Result<Option<Course>> {
        CourseEntity::find_by_id(course_code.to_string())
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Insert a new document row
    #[allow(clippy::too_many_arguments)]
    pub async fn create_document(
        &self,
        course_code: String,
        filename: String,
        s3_key: String,
        content_type: String,
        file_size: i64,
        uploaded_by: String,
    ) -> Result<Document> {
        let document_id = Uuid::new_v4();
        let now = chrono::Utc::now();

        let document = DocumentActiveModel {
            id: Set(document_id),
            course_code: Set(course_code),
            filename: Set(filename),
            s3_key: Set(s3_key),
            content_type: Set(content_type),
            file_size: Set(file_size),
            status: Set(String::from(DocumentStatus::Uploaded)),
            uploaded_by: Set(uploaded_by),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        document.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find a document by id
    pub async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List documents for a course, most recent first
    pub async fn list_documents_by_course(&self, course_code: &str) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::CourseCode.eq(course_code))
            .order_by_desc(DocumentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Documents in a course whose status is one of `statuses`. `None` means "any status".
    pub async fn find_documents_by_course_and_statuses(
        &self,
        course_code: &str,
        statuses: Option<&[DocumentStatus]>,
    ) -> Result<Vec<Document>> {
        let mut query =
            DocumentEntity::find().filter(DocumentColumn::CourseCode.eq(course_code));

        if let Some(statuses) = statuses {
            let strings: Vec<String> = statuses.iter().map(|s| String::from(*s)).collect();
            query = query.filter(DocumentColumn::Status.is_in(strings));
        }

        query
            .order_by_asc(DocumentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Documents in a course whose id is in `ids`, in course order
    pub async fn find_documents_by_ids(
        &self,
        course_code: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::CourseCode.eq(course_code))
            .filter(DocumentColumn::Id.is_in(ids.to_vec()))
            .order_by_asc(DocumentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Update a document's lifecycle status
    pub async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
    ) -> Result<Document> {
        let now = chrono::Utc::now();
        let mut document: DocumentActiveModel = DocumentEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?
            .into();

        document.status = Set(String::from(status));
        document.updated_at = Set(now.into());

        document.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Delete a document row. Returns an error if it did not exist, matching
    /// the contract that deleting a vanished document is not a no-op.
    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        let result = DocumentEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::DocumentNotFound { id: id.to_string() });
        }

        Ok(())
    }

    // ========================================================================
    // Ingestion Job Operations
    // ========================================================================

    /// Insert a new job row in QUEUED status. `docs_total` is fixed here and
    /// never rewritten afterwards.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_job(
        &self,
        course_code: String,
        mode: IngestionMode,
        document_ids: Vec<Uuid>,
        docs_total: i32,
        max_retries: i32,
        created_by: String,
    ) -> Result<IngestionJob> {
        let job_id = Uuid::new_v4();
        let now = chrono::Utc::now();

        let job = IngestionJobActiveModel {
            id: Set(job_id),
            course_code: Set(course_code),
            mode: Set(String::from(mode)),
            document_ids: Set(serde_json::to_value(document_ids).unwrap_or_default()),
            status: Set(String::from(JobStatus::Queued)),
            docs_total: Set(docs_total),
            docs_done: Set(0),
            vectors_created: Set(0),
            retry_count: Set(0),
            max_retries: Set(max_retries),
            error_message: Set(None),
            created_by: Set(created_by),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            started_at: Set(None),
            completed_at: Set(None),
        };

        job.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find a job by id
    pub async fn find_job_by_id(&self, id: Uuid) -> Result<Option<IngestionJob>> {
        IngestionJobEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List jobs for a course with pagination, most recent first
    pub async fn list_jobs_by_course(
        &self,
        course_code: &str,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<IngestionJob>, u64)> {
        let paginator = IngestionJobEntity::find()
            .filter(IngestionJobColumn::CourseCode.eq(course_code))
            .order_by_desc(IngestionJobColumn::CreatedAt)
            .paginate(self.read_conn(), limit.max(1));

        let total = paginator.num_items().await?;
        let jobs = paginator.fetch_page(offset / limit.max(1)).await?;

        Ok((jobs, total))
    }

    /// Atomically claim a QUEUED job, moving it to RUNNING. Returns
    /// `IngestionJobNotFound` if the job does not exist, and `IngestionJob`
    /// (a conflict) if it exists but is not QUEUED — either already claimed
    /// by another worker or in a terminal state.
    pub async fn claim_job(&self, job_id: Uuid) -> Result<IngestionJob> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE ingestion_jobs
            SET status = 'RUNNING', started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'QUEUED'
            "#,
            vec![job_id.into()],
        );

        let result = self.write_conn().execute(stmt).await?;

        if result.rows_affected() == 0 {
            return match self.find_job_by_id(job_id).await? {
                None => Err(AppError::IngestionJobNotFound {
                    id: job_id.to_string(),
                }),
                Some(_) => Err(AppError::IngestionJob {
                    message: format!("job {job_id} is not QUEUED"),
                }),
            };
        }

        self.find_job_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::IngestionJobNotFound {
                id: job_id.to_string(),
            })
    }

    /// Cancel a job. Legal from QUEUED or RUNNING; a no-op cancel request
    /// against a terminal job is rejected rather than silently ignored.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<IngestionJob> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE ingestion_jobs
            SET status = 'CANCELED', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('QUEUED', 'RUNNING')
            "#,
            vec![job_id.into()],
        );

        let result = self.write_conn().execute(stmt).await?;

        if result.rows_affected() == 0 {
            return match self.find_job_by_id(job_id).await? {
                None => Err(AppError::IngestionJobNotFound {
                    id: job_id.to_string(),
                }),
                Some(job) => Err(AppError::IngestionJob {
                    message: format!("job {job_id} is already {}", job.status),
                }),
            };
        }

        self.find_job_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::IngestionJobNotFound {
                id: job_id.to_string(),
            })
    }

    /// Retry a FAILED job, moving it back to QUEUED and incrementing
    /// `retry_count`. Refuses CANCELED jobs and refuses once `retry_count`
    /// has reached `max_retries`.
    pub async fn retry_job(&self, job_id: Uuid) -> Result<IngestionJob> {
        let job = self
            .find_job_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::IngestionJobNotFound {
                id: job_id.to_string(),
            })?;

        if job.job_status() != JobStatus::Failed {
            return Err(AppError::IngestionJob {
                message: format!("job {job_id} is not FAILED (status is {})", job.status),
            });
        }

        if job.retry_count >= job.max_retries {
            return Err(AppError::IngestionJob {
                message: format!(
                    "job {job_id} has exhausted its retry budget ({}/{})",
                    job.retry_count, job.max_retries
                ),
            });
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE ingestion_jobs
            SET status = 'QUEUED', retry_count = retry_count + 1,
                error_message = NULL, started_at = NULL, completed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'FAILED'
            "#,
            vec![job_id.into()],
        );

        let result = self.write_conn().execute(stmt).await?;

        if result.rows_affected() == 0 {
            return Err(AppError::IngestionJob {
                message: format!("job {job_id} changed state concurrently, retry aborted"),
            });
        }

        self.find_job_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::IngestionJobNotFound {
                id: job_id.to_string(),
            })
    }

    /// Jobs still QUEUED, oldest first. Used by the recovery sweep to
    /// re-dispatch jobs whose orchestrator task never ran (e.g. the
    /// process that accepted the submission crashed before `tokio::spawn`
    /// took hold).
    pub async fn find_queued_jobs(&self, limit: u64) -> Result<Vec<IngestionJob>> {
        IngestionJobEntity::find()
            .filter(IngestionJobColumn::Status.eq(String::from(JobStatus::Queued)))
            .order_by_asc(IngestionJobColumn::CreatedAt)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Cheap read used by the orchestrator's cancellation checkpoint
    pub async fn is_job_canceled(&self, job_id: Uuid) -> Result<bool> {
        let job = self
            .find_job_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::IngestionJobNotFound {
                id: job_id.to_string(),
            })?;

        Ok(job.job_status() == JobStatus::Canceled)
    }

    /// Atomically bump `docs_done` and `vectors_created` after a document
    /// finishes processing (successfully or not).
    pub async fn increment_job_progress(
        &self,
        job_id: Uuid,
        docs_done_delta: i32,
        vectors_created_delta: i32,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE ingestion_jobs
            SET docs_done = docs_done + $1,
                vectors_created = vectors_created + $2,
                updated_at = NOW()
            WHERE id = $3
            "#,
            vec![
                docs_done_delta.into(),
                vectors_created_delta.into(),
                job_id.into(),
            ],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Move a RUNNING job to a terminal state (COMPLETED or FAILED)
    pub async fn set_job_terminal(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<IngestionJob> {
        let mut job: IngestionJobActiveModel = IngestionJobEntity::find_by_id(job_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::IngestionJobNotFound {
                id: job_id.to_string(),
            })?
            .into();

        job.status = Set(String::from(status));
        job.error_message = Set(error_message);
        job.completed_at = Set(Some(chrono::Utc::now().into()));
        job.updated_at = Set(chrono::Utc::now().into());

        job.update(self.write_conn()).await.map_err(Into::into)
    }
}
