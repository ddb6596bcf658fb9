//! Embedder adapter
//!
//! Text -> fixed-dimension float vectors. Two providers: a deterministic
//! local embedder (no network, used in tests and offline deployments) and
//! a hosted OpenAI-compatible client.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation. Batch order is preserved; an empty
/// input returns an empty output.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embeddings for a batch of texts, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The fixed length of every vector this embedder produces.
    fn dimension(&self) -> usize;
}

/// Deterministic, dependency-free embedder. Hashes each text into a
/// reproducible pseudo-vector; no network or model weights involved.
/// Used for local development, tests, and the default `local` provider.
pub struct LocalEmbedder {
    dimension: usize,
}

impl LocalEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Derive a unit-ish vector from the text's bytes, FNV-1a seeded per
    /// dimension index so that results are stable across runs.
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let mut hash: u64 = 0xcbf29ce484222325 ^ (i as u64);
            for byte in text.as_bytes() {
                hash ^= *byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            // Map to [-1.0, 1.0]
            let normalized = (hash % 20000) as f32 / 10000.0 - 1.0;
            out.push(normalized);
        }
        out
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Hosted OpenAI-compatible embedding client.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        let dimension = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build embedding HTTP client");

        Self {
            client,
            api_key,
            model,
            dimension,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries,
        }
    }

    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingError {
            message: "embedding request failed with no recorded error".to_string(),
        }))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&OpenAiRequest {
                input: texts,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("embedding API returned {status}: {body}"),
            });
        }

        let parsed: OpenAiResponse = response.json().await.map_err(|e| AppError::EmbeddingError {
            message: format!("failed to parse embedding response: {e}"),
        })?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // OpenAI accepts large batches but we chunk conservatively so a
        // single oversized document never produces one giant request.
        const BATCH_SIZE: usize = 100;
        let mut all = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            all.extend(self.request_with_retry(chunk).await?);
        }

        Ok(all)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build an embedder from the `local`|`openai` provider name.
pub fn create_embedder(
    provider: &str,
    api_key: Option<String>,
    model: String,
    base_url: Option<String>,
    dimension: usize,
    timeout: Duration,
    max_retries: u32,
) -> Result<Arc<dyn Embedder>> {
    match provider {
        "openai" => {
            let key = api_key.ok_or_else(|| AppError::Configuration {
                message: "embedding provider is openai but no API key was configured".to_string(),
            })?;
            Ok(Arc::new(OpenAiEmbedder::new(
                key,
                model,
                base_url,
                timeout,
                max_retries,
            )))
        }
        "local" => Ok(Arc::new(LocalEmbedder::new(dimension))),
        other => Err(AppError::Configuration {
            message: format!("unknown embedding provider: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_embedder_produces_fixed_dimension() {
        let embedder = LocalEmbedder::new(128);
        let out = embedder
            .embed_batch(&["hello world".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 128);
    }

    #[tokio::test]
    async fn local_embedder_is_deterministic() {
        let embedder = LocalEmbedder::new(64);
        let a = embedder.embed_batch(&["same text".to_string()]).await.unwrap();
        let b = embedder.embed_batch(&["same text".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn local_embedder_distinguishes_texts() {
        let embedder = LocalEmbedder::new(64);
        let a = embedder.embed_batch(&["text one".to_string()]).await.unwrap();
        let b = embedder.embed_batch(&["text two".to_string()]).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let embedder = LocalEmbedder::new(64);
        let out = embedder.embed_batch(&[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = LocalEmbedder::new(32);
        let texts = vec!["first".to_string(), "second".to_string(), "third".to_string()];
        let out = embedder.embed_batch(&texts).await.unwrap();
        for (i, text) in texts.iter().enumerate() {
            let solo = embedder.embed_batch(&[text.clone()]).await.unwrap();
            assert_eq!(out[i], solo[0]);
        }
    }

    #[test]
    fn create_embedder_rejects_unknown_provider() {
        let result = create_embedder(
            "carrier-pigeon",
            None,
            "model".to_string(),
            None,
            768,
            Duration::from_secs(5),
            0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn create_embedder_rejects_missing_openai_key() {
        let result = create_embedder(
            "openai",
            None,
            "text-embedding-3-small".to_string(),
            None,
            1536,
            Duration::from_secs(5),
            0,
        );
        assert!(result.is_err());
    }
}
