//! Vector Store adapter
//!
//! A single named collection, cosine distance, with payload indices on
//! `course_code` and `document_id` so the pipeline's delete-by-document
//! and the search endpoint's course filter are both equality lookups
//! rather than scans.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

/// One point to be upserted: an id, its embedding, and a flat payload.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, JsonValue>,
}

/// A single search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: HashMap<String, JsonValue>,
}

/// Single-collection vector store. Dimension is fixed at first
/// `ensure_collection` call and never changes afterward.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection and its payload indices if they don't exist yet.
    /// Idempotent: calling this N times has the same effect as calling it once.
    async fn ensure_collection(&self, dimension: usize) -> Result<()>;

    /// Insert-or-replace points by id. Atomic from the caller's perspective.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize>;

    /// Delete all points whose payload `document_id` matches. Succeeds
    /// (as a no-op) even when zero points match.
    async fn delete_by_document(&self, document_id: Uuid) -> Result<()>;

    /// Cosine nearest-neighbour search, optionally restricted to a course.
    async fn search(
        &self,
        query_vector: &[f32],
        course_code: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;
}

/// Qdrant-backed implementation of [`VectorStore`].
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    pub fn new(client: Qdrant, collection: String) -> Self {
        Self { client, collection }
    }

    fn map_err(e: impl std::fmt::Display) -> AppError {
        AppError::VectorStore {
            message: e.to_string(),
        }
    }

    fn extract_string(value: &qdrant_client::qdrant::Value) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn qdrant_value_to_json(value: &qdrant_client::qdrant::Value) -> JsonValue {
        match &value.kind {
            Some(Kind::StringValue(s)) => JsonValue::String(s.clone()),
            Some(Kind::IntegerValue(i)) => JsonValue::Number((*i).into()),
            Some(Kind::DoubleValue(d)) => {
                serde_json::Number::from_f64(*d).map(JsonValue::Number).unwrap_or(JsonValue::Null)
            }
            Some(Kind::BoolValue(b)) => JsonValue::Bool(*b),
            _ => JsonValue::Null,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(Self::map_err)?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        self.client
            .create_field_index(
                self.collection.clone(),
                "course_code",
                qdrant_client::qdrant::FieldType::Keyword,
                None,
                None,
            )
            .await
            .map_err(Self::map_err)?;

        self.client
            .create_field_index(
                self.collection.clone(),
                "document_id",
                qdrant_client::qdrant::FieldType::Keyword,
                None,
                None,
            )
            .await
            .map_err(Self::map_err)?;

        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let json_payload: serde_json::Map<String, JsonValue> =
                    p.payload.into_iter().collect();
                let payload =
                    Payload::try_from(JsonValue::Object(json_payload)).unwrap_or_default();
                PointStruct::new(p.id.to_string(), p.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, qdrant_points).wait(true))
            .await
            .map_err(Self::map_err)?;

        Ok(count)
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<()> {
        let filter = Filter::must([Condition::matches(
            "document_id",
            document_id.to_string(),
        )]);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        course_code: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut builder =
            SearchPointsBuilder::new(&self.collection, query_vector.to_vec(), limit as u64)
                .with_payload(true);

        if let Some(course) = course_code {
            builder = builder.filter(Filter::must([Condition::matches(
                "course_code",
                course.to_string(),
            )]));
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(Self::map_err)?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|scored| {
                let id_str = scored.id.as_ref().and_then(|pid| match &pid.point_id_options {
                    Some(PointIdOptions::Uuid(s)) => Some(s.clone()),
                    Some(PointIdOptions::Num(n)) => Some(n.to_string()),
                    None => None,
                })?;
                let id = Uuid::parse_str(&id_str).ok()?;

                let payload = scored
                    .payload
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::qdrant_value_to_json(v)))
                    .collect();

                Some(SearchHit {
                    id,
                    score: scored.score,
                    payload,
                })
            })
            .collect();

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_string_reads_string_kind() {
        let value = qdrant_client::qdrant::Value {
            kind: Some(Kind::StringValue("CS101".to_string())),
        };
        assert_eq!(
            QdrantVectorStore::extract_string(&value),
            Some("CS101".to_string())
        );
    }

    #[test]
    fn extract_string_ignores_non_string_kind() {
        let value = qdrant_client::qdrant::Value {
            kind: Some(Kind::IntegerValue(4)),
        };
        assert_eq!(QdrantVectorStore::extract_string(&value), None);
    }
}
