//! Ingestion recovery sweep
//!
//! Jobs are normally driven by an in-process orchestrator task spawned
//! directly from the gateway's submission handler. This binary exists
//! for the case that task never ran — the gateway process restarted or
//! crashed between inserting the QUEUED row and spawning the task. It
//! periodically re-dispatches any job still QUEUED, relying on the
//! claim's compare-and-set so a job already picked up elsewhere is
//! simply skipped here.

use aws_config::BehaviorVersion;
use std::sync::Arc;
use std::time::Duration;
use syllabus_common::blob::S3BlobStore;
use syllabus_common::config::AppConfig;
use syllabus_common::db::DbPool;
use syllabus_common::embeddings::create_embedder;
use syllabus_common::vector::QdrantVectorStore;
use syllabus_common::{Repository, VERSION};
use syllabus_ingestion::orchestrator::{self, ChunkConfig};
use tracing::{error, info, Level};

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("starting ingestion recovery sweep v{}", VERSION);

    let config = AppConfig::load().map_err(|e| {
        error!(error = %e, "failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);

    let aws_shared_config = aws_config::defaults(BehaviorVersion::latest())
        .load()
        .await;
    let s3_client = aws_sdk_s3::Client::new(&aws_shared_config);
    let blob_store: Arc<dyn syllabus_common::BlobStore> =
        Arc::new(S3BlobStore::new(s3_client, config.blob_store.bucket.clone()));

    let qdrant = qdrant_client::Qdrant::from_url(&config.vector_store.url)
        .api_key(config.vector_store.api_key.clone())
        .build()?;
    let vector_store: Arc<dyn syllabus_common::VectorStore> = Arc::new(QdrantVectorStore::new(
        qdrant,
        config.vector_store.collection_name.clone(),
    ));

    let embedder = create_embedder(
        &config.embedding.provider,
        config.embedding.api_key.clone(),
        config.embedding.model.clone(),
        config.embedding.api_base.clone(),
        config.embedding.dimension,
        Duration::from_secs(config.embedding.timeout_secs),
        config.embedding.max_retries,
    )?;

    let chunk_config = ChunkConfig {
        chunk_size: config.ingestion.chunk_size,
        chunk_overlap: config.ingestion.chunk_overlap,
    };

    info!(interval_secs = SWEEP_INTERVAL.as_secs(), "recovery sweep ready");

    let mut shutdown = Box::pin(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("recovery sweep shutting down");
                break;
            }
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                if let Err(e) = sweep(&repository, &blob_store, &vector_store, &embedder, chunk_config).await {
                    error!(error = %e, "recovery sweep iteration failed");
                }
            }
        }
    }

    Ok(())
}

async fn sweep(
    repository: &Repository,
    blob_store: &Arc<dyn syllabus_common::BlobStore>,
    vector_store: &Arc<dyn syllabus_common::VectorStore>,
    embedder: &Arc<dyn syllabus_common::Embedder>,
    chunk_config: ChunkConfig,
) -> syllabus_common::Result<()> {
    let stale = repository.find_queued_jobs(50).await?;
    if stale.is_empty() {
        return Ok(());
    }

    info!(count = stale.len(), "re-dispatching stale QUEUED jobs");

    for job in stale {
        let job_id = job.id;
        let repository = repository.clone();
        let blob_store = blob_store.clone();
        let vector_store = vector_store.clone();
        let embedder = embedder.clone();

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
                error!(job_id = %job_id, error = %e, "recovered job run failed");
            }
        });
    }

    Ok(())
}
