//! Qdrant vector database over its REST API
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::VectorIndex;
use crate::storage::{StoreError, StoreResult};

/// Qdrant wraps every payload in `{"result": ..., "status": ..., "time": ...}`
#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ItemPayload {
    item_id: String,
}

#[derive(Debug, Serialize)]
struct PointStruct {
    id: Uuid,
    vector: Vec<f32>,
    payload: ItemPayload,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<ItemPayload>,
}

/// Deterministic point id so re-seeding the catalog overwrites instead of duplicating
fn point_id(item_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, item_id.as_bytes())
}

fn item_ids_from_hits(hits: Vec<ScoredPoint>) -> Vec<String> {
    hits.into_iter()
        .filter_map(|hit| hit.payload.map(|p| p.item_id))
        .collect()
}

#[derive(Clone)]
pub struct QdrantIndex {
    http_client: HttpClient,
    base_url: String,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    pub fn new(base_url: String, collection: String, dimension: usize) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
            dimension,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Creates the collection (cosine distance) if it does not exist yet
    pub async fn ensure_collection(&self) -> StoreResult<()> {
        let response = self.http_client.get(self.collection_url()).send().await?;

        if response.status().is_success() {
            tracing::debug!(collection = %self.collection, "Qdrant collection exists");
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(StoreError::Unavailable(format!(
                "Qdrant returned {} for collection lookup",
                response.status()
            )));
        }

        tracing::info!(
            collection = %self.collection,
            dimension = self.dimension,
            "Creating Qdrant collection"
        );

        self.http_client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.dimension, "distance": "Cosine" }
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, item_id: &str, embedding: Vec<f32>) -> StoreResult<()> {
        if embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let point = PointStruct {
            id: point_id(item_id),
            vector: embedding,
            payload: ItemPayload {
                item_id: item_id.to_string(),
            },
        };

        self.http_client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": [point] }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn remove(&self, item_id: &str) -> StoreResult<()> {
        self.http_client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&json!({ "points": [point_id(item_id)] }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn top_k(&self, query: &[f32], k: usize) -> StoreResult<Vec<String>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let response: QdrantResponse<Vec<ScoredPoint>> = self
            .http_client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(item_ids_from_hits(response.result))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/collections", self.base_url);
        match self.http_client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Qdrant health check failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic() {
        assert_eq!(point_id("item_0001"), point_id("item_0001"));
        assert_ne!(point_id("item_0001"), point_id("item_0002"));
    }

    #[test]
    fn test_collection_url_trims_trailing_slash() {
        let index = QdrantIndex::new("http://qdrant:6333/".to_string(), "items".to_string(), 8);
        assert_eq!(index.collection_url(), "http://qdrant:6333/collections/items");
    }

    #[test]
    fn test_point_serialization() {
        let point = PointStruct {
            id: point_id("item_0003"),
            vector: vec![0.5, -0.5],
            payload: ItemPayload {
                item_id: "item_0003".to_string(),
            },
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["payload"]["item_id"], "item_0003");
        assert_eq!(json["vector"].as_array().unwrap().len(), 2);
        assert!(json["id"].is_string());
    }

    #[test]
    fn test_search_response_parsing() {
        let body = r#"{
            "result": [
                {"id": "a", "version": 1, "score": 0.91, "payload": {"item_id": "item_0042"}},
                {"id": "b", "version": 1, "score": 0.50},
                {"id": "c", "version": 1, "score": 0.12, "payload": {"item_id": "item_0007"}}
            ],
            "status": "ok",
            "time": 0.0004
        }"#;

        let response: QdrantResponse<Vec<ScoredPoint>> = serde_json::from_str(body).unwrap();
        assert_eq!(
            item_ids_from_hits(response.result),
            vec!["item_0042", "item_0007"]
        );
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let index = QdrantIndex::new("http://127.0.0.1:1".to_string(), "items".to_string(), 4);
        let err = index.upsert("item_0001", vec![1.0]).await.unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_health_check_reports_unreachable_qdrant() {
        let index = QdrantIndex::new("http://127.0.0.1:1".to_string(), "items".to_string(), 4);
        assert!(!index.health_check().await);
    }
}
