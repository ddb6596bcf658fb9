//! Syllabus API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication and authorization
//! - Request routing
//! - Observability (logging, metrics, tracing)
//! - Dispatch of background ingestion orchestrator tasks

mod handlers;

use aws_config::BehaviorVersion;
use axum::{
    routing::{delete, get, post},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use syllabus_common::auth::JwtManager;
use syllabus_common::blob::{BlobStore, S3BlobStore};
use syllabus_common::config::AppConfig;
use syllabus_common::db::DbPool;
use syllabus_common::embeddings::{create_embedder, Embedder};
use syllabus_common::vector::{QdrantVectorStore, VectorStore};
use syllabus_common::{metrics, DocumentService, Repository};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Repository,
    pub blob_store: Arc<dyn BlobStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub document_service: Arc<DocumentService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("starting syllabus API gateway v{}", syllabus_common::VERSION);

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    if config.observability.metrics_port != 0 {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
            .install()
            .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;
    }
    metrics::register_metrics();

    info!("connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);

    let aws_shared_config = aws_config::defaults(BehaviorVersion::latest())
        .load()
        .await;
    let s3_client = aws_sdk_s3::Client::new(&aws_shared_config);
    let blob_store: Arc<dyn BlobStore> =
        Arc::new(S3BlobStore::new(s3_client, config.blob_store.bucket.clone()));

    let qdrant = qdrant_client::Qdrant::from_url(&config.vector_store.url)
        .api_key(config.vector_store.api_key.clone())
        .build()?;
    let vector_store: Arc<dyn VectorStore> = Arc::new(QdrantVectorStore::new(
        qdrant,
        config.vector_store.collection_name.clone(),
    ));

    let embedder: Arc<dyn Embedder> = create_embedder(
        &config.embedding.provider,
        config.embedding.api_key.clone(),
        config.embedding.model.clone(),
        config.embedding.api_base.clone(),
        config.embedding.dimension,
        Duration::from_secs(config.embedding.timeout_secs),
        config.embedding.max_retries,
    )?;

    let document_service = Arc::new(DocumentService::new(
        repository.clone(),
        blob_store.clone(),
        vector_store.clone(),
    ));

    let jwt_secret = config
        .auth
        .jwt_secret
        .clone()
        .unwrap_or_else(|| "dev-secret-change-me".to_string());
    let jwt_manager = Arc::new(JwtManager::new(&jwt_secret, config.auth.jwt_expiration_secs));

    let state = AppState {
        config: config.clone(),
        repository,
        blob_store,
        vector_store,
        embedder,
        document_service,
    };

    let app = create_router(state, jwt_manager);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState, jwt_manager: Arc<JwtManager>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/documents", post(handlers::documents::create_document))
        .route("/documents", get(handlers::documents::list_documents))
        .route("/documents/:document_id", get(handlers::documents::get_document))
        .route("/documents/:document_id", delete(handlers::documents::delete_document))
        .route(
            "/documents/:document_id/download-url",
            get(handlers::documents::download_url),
        )
        .route("/ingestions/start", post(handlers::ingestions::start_job))
        .route("/ingestions/list", get(handlers::ingestions::list_jobs))
        .route("/ingestions/status", get(handlers::ingestions::get_status))
        .route("/ingestions/cancel", post(handlers::ingestions::cancel_job))
        .route("/ingestions/retry", post(handlers::ingestions::retry_job));

    Router::new()
        .nest("/v2", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .layer(Extension(jwt_manager))
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("received SIGTERM, starting shutdown..."),
    }
}
