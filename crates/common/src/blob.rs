//! Blob Store adapter
//!
//! Opaque byte blobs addressed by key. The ingestion pipeline downloads
//! document bytes through this trait; the document service uploads and
//! deletes through it. Keys are validated before any network call so a
//! malformed key never reaches the backing store.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::time::Duration;

/// Minimum presigned URL TTL the adapter will accept (1 second).
pub const MIN_PRESIGN_TTL_SECS: u64 = 1;
/// Maximum presigned URL TTL the adapter will accept (7 days).
pub const MAX_PRESIGN_TTL_SECS: u64 = 7 * 24 * 3600;

/// Validate a blob key: non-empty, no leading slash, no `//`, no `..`
/// segment, and restricted to a safe charset.
pub fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(AppError::InvalidFormat {
            message: "blob key cannot be empty".to_string(),
        });
    }

    if key.starts_with('/') {
        return Err(AppError::InvalidFormat {
            message: "blob key cannot start with a slash".to_string(),
        });
    }

    if key.contains("//") {
        return Err(AppError::InvalidFormat {
            message: "blob key cannot contain consecutive slashes".to_string(),
        });
    }

    if key.split('/').any(|segment| segment == "..") {
        return Err(AppError::InvalidFormat {
            message: "blob key cannot contain a path traversal segment".to_string(),
        });
    }

    let valid_charset = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '.' | '-'));
    if !valid_charset {
        return Err(AppError::InvalidFormat {
            message: "blob key contains invalid characters".to_string(),
        });
    }

    Ok(())
}

/// Validate a presigned URL TTL against the adapter's bounds.
pub fn validate_ttl(ttl_secs: u64) -> Result<()> {
    if !(MIN_PRESIGN_TTL_SECS..=MAX_PRESIGN_TTL_SECS).contains(&ttl_secs) {
        return Err(AppError::InvalidFormat {
            message: format!(
                "presign TTL must be between {MIN_PRESIGN_TTL_SECS} and {MAX_PRESIGN_TTL_SECS} seconds, got {ttl_secs}"
            ),
        });
    }
    Ok(())
}

/// Opaque byte-blob storage. One named bucket/container per deployment.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `body` under `key`, replacing any existing object at that key.
    async fn upload(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Download the bytes stored at `key`.
    async fn download(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete the object at `key`. Implementations should treat a missing
    /// object as success, matching the delete-by-document idempotence the
    /// pipeline relies on.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Generate a time-limited URL for reading `key` without credentials.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String>;
}

/// S3-compatible implementation of [`BlobStore`].
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        validate_key(key)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("upload {key} failed: {e}"),
            })?;

        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("download {key} failed: {e}"),
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("reading {key} body failed: {e}"),
            })?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("delete {key} failed: {e}"),
            })?;

        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        validate_key(key)?;
        validate_ttl(ttl.as_secs())?;

        let presigning_config = aws_sdk_s3::presigning::PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::Storage {
                message: format!("invalid presign config for {key}: {e}"),
            })?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| AppError::Storage {
                message: format!("presign {key} failed: {e}"),
            })?;

        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_key() {
        assert!(validate_key("").is_err());
        assert!(validate_key("   ").is_err());
    }

    #[test]
    fn rejects_leading_slash() {
        assert!(validate_key("/documents/x").is_err());
    }

    #[test]
    fn rejects_double_slash() {
        assert!(validate_key("documents//x").is_err());
    }

    #[test]
    fn rejects_traversal_segment() {
        assert!(validate_key("documents/../x").is_err());
        assert!(validate_key("../x").is_err());
    }

    #[test]
    fn rejects_invalid_charset() {
        assert!(validate_key("documents/x?y").is_err());
    }

    #[test]
    fn accepts_well_formed_key() {
        let id = "3fa85f64-5717-4562-b3fc-2c963f66afa6";
        assert!(validate_key(&format!("documents/CS101/{id}/notes.pdf")).is_ok());
    }

    #[test]
    fn ttl_bounds() {
        assert!(validate_ttl(0).is_err());
        assert!(validate_ttl(1).is_ok());
        assert!(validate_ttl(MAX_PRESIGN_TTL_SECS).is_ok());
        assert!(validate_ttl(MAX_PRESIGN_TTL_SECS + 1).is_err());
    }
}
