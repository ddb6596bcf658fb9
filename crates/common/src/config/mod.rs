//! Configuration management for the ingestion service
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Blob store (S3-compatible) configuration
    pub blob_store: BlobStoreConfig,

    /// Vector store (Qdrant) configuration
    pub vector_store: VectorStoreConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Ingestion job engine configuration
    pub ingestion: IngestionConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlobStoreConfig {
    /// Bucket name
    pub bucket: String,

    /// Region
    #[serde(default = "default_blob_region")]
    pub region: String,

    /// Custom endpoint (for S3-compatible stores such as MinIO); None uses AWS defaults
    pub endpoint: Option<String>,

    /// Minimum allowed presigned URL TTL in seconds
    #[serde(default = "default_presign_min_ttl")]
    pub presign_min_ttl_secs: u64,

    /// Maximum allowed presigned URL TTL in seconds
    #[serde(default = "default_presign_max_ttl")]
    pub presign_max_ttl_secs: u64,

    /// Default presigned URL TTL in seconds when not specified by the caller
    #[serde(default = "default_presign_default_ttl")]
    pub presign_default_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    /// Qdrant URL
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// API key, if the cluster requires one
    pub api_key: Option<String>,

    /// Collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Request timeout in seconds
    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, local
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunk overlap in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Default maximum retries for a newly created job
    #[serde(default = "default_job_max_retries")]
    pub default_max_retries: u32,

    /// Hard ceiling on max_retries a caller may request
    #[serde(default = "default_job_max_retries_ceiling")]
    pub max_retries_ceiling: u32,

    /// Maximum document_ids a SELECTED-mode job may name
    #[serde(default = "default_max_document_ids")]
    pub max_document_ids: usize,

    /// Maximum file size accepted for a document upload, in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,

    /// Poll interval for the cooperative cancellation checkpoint, in milliseconds
    #[serde(default = "default_cancel_poll_interval")]
    pub cancel_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token signing
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Authorization header name
    #[serde(default = "default_auth_header")]
    pub auth_header: String,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// OpenTelemetry endpoint
    pub otel_endpoint: Option<String>,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_max_concurrent() -> usize {
    100
}
fn default_max_connections() -> u32 {
    50
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    300
}
fn default_blob_region() -> String {
    "us-east-1".to_string()
}
fn default_presign_min_ttl() -> u64 {
    1
}
fn default_presign_max_ttl() -> u64 {
    7 * 24 * 3600
}
fn default_presign_default_ttl() -> u64 {
    3600
}
fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection_name() -> String {
    "course_documents".to_string()
}
fn default_vector_timeout() -> u64 {
    30
}
fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dimension() -> usize {
    768
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_embedding_retries() -> u32 {
    3
}
fn default_batch_size() -> usize {
    32
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_job_max_retries() -> u32 {
    2
}
fn default_job_max_retries_ceiling() -> u32 {
    10
}
fn default_max_document_ids() -> usize {
    1000
}
fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}
fn default_cancel_poll_interval() -> u64 {
    250
}
fn default_jwt_expiration() -> u64 {
    3600
}
fn default_auth_header() -> String {
    "Authorization".to_string()
}
fn default_request_id_header() -> String {
    "X-Request-ID".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_service_name() -> String {
    "syllabus-ingestion".to_string()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database
            .read_url
            .as_deref()
            .unwrap_or(&self.database.url)
    }

    /// Clamp a caller-requested presign TTL to the configured bounds
    pub fn clamp_presign_ttl(&self, requested_secs: Option<u64>) -> u64 {
        let requested = requested_secs.unwrap_or(self.blob_store.presign_default_ttl_secs);
        requested.clamp(
            self.blob_store.presign_min_ttl_secs,
            self.blob_store.presign_max_ttl_secs,
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
                max_concurrent_requests: default_max_concurrent(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/syllabus".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            blob_store: BlobStoreConfig {
                bucket: "course-documents".to_string(),
                region: default_blob_region(),
                endpoint: None,
                presign_min_ttl_secs: default_presign_min_ttl(),
                presign_max_ttl_secs: default_presign_max_ttl(),
                presign_default_ttl_secs: default_presign_default_ttl(),
            },
            vector_store: VectorStoreConfig {
                url: default_qdrant_url(),
                api_key: None,
                collection_name: default_collection_name(),
                timeout_secs: default_vector_timeout(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                max_retries: default_embedding_retries(),
                batch_size: default_batch_size(),
            },
            ingestion: IngestionConfig {
                chunk_size: default_chunk_size(),
                chunk_overlap: default_chunk_overlap(),
                default_max_retries: default_job_max_retries(),
                max_retries_ceiling: default_job_max_retries_ceiling(),
                max_document_ids: default_max_document_ids(),
                max_file_size_bytes: default_max_file_size(),
                cancel_poll_interval_ms: default_cancel_poll_interval(),
            },
            auth: AuthConfig {
                jwt_secret: None,
                jwt_expiration_secs: default_jwt_expiration(),
                auth_header: default_auth_header(),
                request_id_header: default_request_id_header(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                otel_endpoint: None,
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ingestion.chunk_size, 1000);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/syllabus");
    }

    #[test]
    fn test_clamp_presign_ttl_within_bounds() {
        let config = AppConfig::default();
        assert_eq!(config.clamp_presign_ttl(Some(600)), 600);
    }

    #[test]
    fn test_clamp_presign_ttl_above_max() {
        let config = AppConfig::default();
        let clamped = config.clamp_presign_ttl(Some(100 * 24 * 3600));
        assert_eq!(clamped, config.blob_store.presign_max_ttl_secs);
    }

    #[test]
    fn test_clamp_presign_ttl_default_when_absent() {
        let config = AppConfig::default();
        assert_eq!(
            config.clamp_presign_ttl(None),
            config.blob_store.presign_default_ttl_secs
        );
    }
}
