//! Job Orchestrator (C9)
//!
//! Drives one claimed job to a terminal state. Dispatched as a background
//! task at submission and retry time, mirroring the request handler's
//! fire-and-continue pattern: the HTTP layer returns 202 immediately and
//! this function runs to completion (or cancellation) independently.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use syllabus_common::blob::BlobStore;
use syllabus_common::db::models::{Document, DocumentStatus, JobStatus};
use syllabus_common::embeddings::Embedder;
use syllabus_common::errors::Result;
use syllabus_common::vector::VectorStore;
use syllabus_common::{metrics, Repository};
use uuid::Uuid;

use crate::pipeline::run_pipeline;
use crate::selector;

/// The repository surface the per-document loop needs. Exists so the loop
/// can be driven against a fake in tests instead of a live database
/// connection; `Repository` is the only production implementation.
#[async_trait]
pub(crate) trait JobRepository: Send + Sync {
    async fn is_job_canceled(&self, job_id: Uuid) -> Result<bool>;
    async fn update_document_status(&self, id: Uuid, status: DocumentStatus) -> Result<Document>;
    async fn increment_job_progress(
        &self,
        job_id: Uuid,
        docs_done_delta: i32,
        vectors_created_delta: i32,
    ) -> Result<()>;
}

#[async_trait]
impl JobRepository for Repository {
    async fn is_job_canceled(&self, job_id: Uuid) -> Result<bool> {
        Repository::is_job_canceled(self, job_id).await
    }

    async fn update_document_status(&self, id: Uuid, status: DocumentStatus) -> Result<Document> {
        Repository::update_document_status(self, id, status).await
    }

    async fn increment_job_progress(
        &self,
        job_id: Uuid,
        docs_done_delta: i32,
        vectors_created_delta: i32,
    ) -> Result<()> {
        Repository::increment_job_progress(self, job_id, docs_done_delta, vectors_created_delta).await
    }
}

/// Configuration the orchestrator needs beyond its adapters.
#[derive(Clone, Copy)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

/// Run a claimed job end to end. Returns `Ok(())` whether the job ended
/// COMPLETED, FAILED, or was a no-op because the claim lost the race —
/// only a repository/database error that occurs outside the job's own
/// state machine propagates as `Err`.
pub async fn run_job(
    job_id: Uuid,
    repository: Repository,
    blob_store: Arc<dyn BlobStore>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunk_config: ChunkConfig,
) -> Result<()> {
    let job = match repository.claim_job(job_id).await {
        Ok(job) => job,
        Err(e) => {
            tracing::info!(job_id = %job_id, error = %e, "job claim did not succeed, skipping");
            return Ok(());
        }
    };

    let started = Instant::now();
    metrics::record_job_claimed(&job.course_code);

    let result = run_claimed_job(&job, &repository, &blob_store, &vector_store, &embedder, chunk_config)
        .await;

    let final_status = match result {
        Ok(()) => JobStatus::Completed,
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "job failed with a fatal orchestration error");
            repository
                .set_job_terminal(job_id, JobStatus::Failed, Some(e.to_string()))
                .await?;
            metrics::record_job_terminal(&job.course_code, "FAILED", started.elapsed().as_secs_f64());
            return Ok(());
        }
    };

    if repository.is_job_canceled(job_id).await? {
        metrics::record_job_terminal(&job.course_code, "CANCELED", started.elapsed().as_secs_f64());
        return Ok(());
    }

    repository
        .set_job_terminal(job_id, final_status, None)
        .await?;
    metrics::record_job_terminal(&job.course_code, "COMPLETED", started.elapsed().as_secs_f64());

    Ok(())
}

async fn run_claimed_job(
    job: &syllabus_common::db::models::IngestionJob,
    repository: &Repository,
    blob_store: &Arc<dyn BlobStore>,
    vector_store: &Arc<dyn VectorStore>,
    embedder: &Arc<dyn Embedder>,
    chunk_config: ChunkConfig,
) -> Result<()> {
    vector_store.ensure_collection(embedder.dimension()).await?;

    let document_ids = job.document_ids_vec();
    let documents = selector::resolve(
        repository,
        &job.course_code,
        job.ingestion_mode(),
        &document_ids,
    )
    .await?;

    process_documents(
        job.id,
        &job.course_code,
        &documents,
        repository,
        blob_store,
        vector_store,
        embedder,
        chunk_config,
    )
    .await
}

/// Drive the resolved documents through the pipeline one at a time,
/// updating per-document status and job progress as each one finishes.
///
/// Only a genuine per-document pipeline failure (storage, extraction,
/// embedding, or vector-store error) marks a document FAILED and bumps
/// `docs_done` — so `docs_total - docs_done` at COMPLETED always equals
/// the number of per-document failures. A cancellation observed either
/// between documents or raised mid-pipeline by `run_pipeline`'s own
/// checkpoints stops the loop without touching the interrupted
/// document's status or any counter.
#[allow(clippy::too_many_arguments)]
async fn process_documents<R: JobRepository>(
    job_id: Uuid,
    course_code: &str,
    documents: &[Document],
    repository: &R,
    blob_store: &Arc<dyn BlobStore>,
    vector_store: &Arc<dyn VectorStore>,
    embedder: &Arc<dyn Embedder>,
    chunk_config: ChunkConfig,
) -> Result<()> {
    for document in documents {
        if repository.is_job_canceled(job_id).await? {
            return Ok(());
        }

        let pipeline_result = run_pipeline(
            document,
            blob_store,
            embedder,
            vector_store,
            chunk_config.chunk_size,
            chunk_config.chunk_overlap,
            || repository.is_job_canceled(job_id),
        )
        .await;

        match pipeline_result {
            Ok(num_vectors) => {
                repository
                    .update_document_status(document.id, DocumentStatus::Ingested)
                    .await?;
                repository
                    .increment_job_progress(job_id, 1, num_vectors as i32)
                    .await?;
                metrics::record_document_processed(course_code, "success");
                metrics::record_vectors_created(course_code, num_vectors);
            }
            Err(e) => {
                // run_pipeline's own checkpoints raise this same error
                // shape for a cancellation observed mid-stage; re-check
                // rather than trust the error variant, since IngestionJob
                // is also used for unrelated illegal-state errors.
                if repository.is_job_canceled(job_id).await? {
                    tracing::info!(
                        job_id = %job_id,
                        document_id = %document.id,
                        "job canceled mid-pipeline, leaving document status unchanged"
                    );
                    return Ok(());
                }

                tracing::warn!(
                    job_id = %job_id,
                    document_id = %document.id,
                    error = %e,
                    "document pipeline failed, marking document FAILED and continuing"
                );
                repository
                    .update_document_status(document.id, DocumentStatus::Failed)
                    .await?;
                metrics::record_document_processed(course_code, "failure");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use syllabus_common::errors::AppError;
    use syllabus_common::vector::{SearchHit, VectorPoint};

    fn test_document(s3_key: &str) -> Document {
        let now = chrono::Utc::now().into();
        Document {
            id: Uuid::new_v4(),
            course_code: "CS101".to_string(),
            filename: "notes.pdf".to_string(),
            s3_key: s3_key.to_string(),
            content_type: "application/pdf".to_string(),
            file_size: 1,
            status: "UPLOADED".to_string(),
            uploaded_by: "prof@example.edu".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[derive(Default)]
    struct FakeRepository {
        canceled: Arc<AtomicBool>,
        statuses: Mutex<HashMap<Uuid, DocumentStatus>>,
        docs_done: Mutex<i32>,
        vectors_created: Mutex<i32>,
    }

    #[async_trait]
    impl JobRepository for FakeRepository {
        async fn is_job_canceled(&self, _job_id: Uuid) -> Result<bool> {
            Ok(self.canceled.load(Ordering::SeqCst))
        }

        async fn update_document_status(
            &self,
            id: Uuid,
            status: DocumentStatus,
        ) -> Result<Document> {
            self.statuses.lock().unwrap().insert(id, status);
            Ok(test_document("documents/CS101/doc/unused.pdf"))
        }

        async fn increment_job_progress(
            &self,
            _job_id: Uuid,
            docs_done_delta: i32,
            vectors_created_delta: i32,
        ) -> Result<()> {
            *self.docs_done.lock().unwrap() += docs_done_delta;
            *self.vectors_created.lock().unwrap() += vectors_created_delta;
            Ok(())
        }
    }

    /// Blob store keyed by s3_key: some keys succeed, some fail, modeling
    /// an ordinary per-document storage error rather than cancellation.
    #[derive(Default)]
    struct KeyedBlobStore {
        bytes_by_key: HashMap<String, Vec<u8>>,
        fail_keys: HashSet<String>,
    }

    #[async_trait]
    impl BlobStore for KeyedBlobStore {
        async fn upload(&self, _key: &str, _body: Vec<u8>, _content_type: &str) -> Result<()> {
            Ok(())
        }

        async fn download(&self, key: &str) -> Result<Vec<u8>> {
            if self.fail_keys.contains(key) {
                return Err(AppError::Storage {
                    message: format!("object not found: {key}"),
                });
            }
            Ok(self.bytes_by_key.get(key).cloned().unwrap_or_default())
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        async fn presign_get(&self, _key: &str, _ttl: Duration) -> Result<String> {
            Ok("https://example.invalid/presigned".to_string())
        }
    }

    /// Blob store that downloads normally but flips a shared cancellation
    /// flag once a designated key is fetched, simulating a cancel request
    /// that lands while that document's pipeline is already in flight.
    struct CancelingBlobStore {
        bytes_by_key: HashMap<String, Vec<u8>>,
        cancel_on_key: String,
        canceled: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BlobStore for CancelingBlobStore {
        async fn upload(&self, _key: &str, _body: Vec<u8>, _content_type: &str) -> Result<()> {
            Ok(())
        }

        async fn download(&self, key: &str) -> Result<Vec<u8>> {
            let bytes = self.bytes_by_key.get(key).cloned().unwrap_or_default();
            if key == self.cancel_on_key {
                self.canceled.store(true, Ordering::SeqCst);
            }
            Ok(bytes)
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        async fn presign_get(&self, _key: &str, _ttl: Duration) -> Result<String> {
            Ok("https://example.invalid/presigned".to_string())
        }
    }

    struct FakeEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1; self.dimension]).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    #[derive(Default)]
    struct FakeVectorStore {
        upserted: Mutex<Vec<VectorPoint>>,
        deleted: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl VectorStore for FakeVectorStore {
        async fn ensure_collection(&self, _dimension: usize) -> Result<()> {
            Ok(())
        }

        async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize> {
            let count = points.len();
            self.upserted.lock().unwrap().extend(points);
            Ok(count)
        }

        async fn delete_by_document(&self, document_id: Uuid) -> Result<()> {
            self.deleted.lock().unwrap().push(document_id);
            Ok(())
        }

        async fn search(
            &self,
            _query_vector: &[f32],
            _course_code: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    fn chunk_config() -> ChunkConfig {
        ChunkConfig {
            chunk_size: 1000,
            chunk_overlap: 0,
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_inflate_docs_done() {
        let doc_a = test_document("documents/CS101/doc/a.pdf");
        let doc_b = test_document("documents/CS101/doc/b.pdf");

        let mut bytes_by_key = HashMap::new();
        bytes_by_key.insert(
            doc_a.s3_key.clone(),
            crate::test_support::minimal_pdf(Some("course material for doc a")),
        );
        let mut fail_keys = HashSet::new();
        fail_keys.insert(doc_b.s3_key.clone());

        let blob_store: Arc<dyn BlobStore> = Arc::new(KeyedBlobStore {
            bytes_by_key,
            fail_keys,
        });
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder { dimension: 8 });
        let vector_store = Arc::new(FakeVectorStore::default());
        let vector_store_dyn: Arc<dyn VectorStore> = vector_store.clone();
        let repository = FakeRepository::default();

        let job_id = Uuid::new_v4();
        process_documents(
            job_id,
            "CS101",
            &[doc_a.clone(), doc_b.clone()],
            &repository,
            &blob_store,
            &vector_store_dyn,
            &embedder,
            chunk_config(),
        )
        .await
        .unwrap();

        assert_eq!(*repository.docs_done.lock().unwrap(), 1);
        let statuses = repository.statuses.lock().unwrap();
        assert_eq!(statuses.get(&doc_a.id), Some(&DocumentStatus::Ingested));
        assert_eq!(statuses.get(&doc_b.id), Some(&DocumentStatus::Failed));
    }

    #[tokio::test]
    async fn cancellation_mid_pipeline_leaves_interrupted_document_untouched() {
        let doc_a = test_document("documents/CS101/doc/a.pdf");
        let doc_b = test_document("documents/CS101/doc/b.pdf");

        let mut bytes_by_key = HashMap::new();
        bytes_by_key.insert(
            doc_a.s3_key.clone(),
            crate::test_support::minimal_pdf(Some("course material for doc a")),
        );
        bytes_by_key.insert(
            doc_b.s3_key.clone(),
            crate::test_support::minimal_pdf(Some("course material for doc b")),
        );

        let canceled = Arc::new(AtomicBool::new(false));
        let blob_store: Arc<dyn BlobStore> = Arc::new(CancelingBlobStore {
            bytes_by_key,
            cancel_on_key: doc_b.s3_key.clone(),
            canceled: canceled.clone(),
        });
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder { dimension: 8 });
        let vector_store = Arc::new(FakeVectorStore::default());
        let vector_store_dyn: Arc<dyn VectorStore> = vector_store.clone();

        let repository = FakeRepository {
            canceled: canceled.clone(),
            ..Default::default()
        };

        let job_id = Uuid::new_v4();
        process_documents(
            job_id,
            "CS101",
            &[doc_a.clone(), doc_b.clone()],
            &repository,
            &blob_store,
            &vector_store_dyn,
            &embedder,
            chunk_config(),
        )
        .await
        .unwrap();

        assert_eq!(*repository.docs_done.lock().unwrap(), 1);
        let statuses = repository.statuses.lock().unwrap();
        assert_eq!(statuses.get(&doc_a.id), Some(&DocumentStatus::Ingested));
        assert_eq!(
            statuses.get(&doc_b.id),
            None,
            "canceled document must not be stamped FAILED or any other status"
        );
    }
}
