//! Embedding and vector-store seams, with a Qdrant REST backend and an
//! in-memory backend.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::MemoryError;

/// Turns text into a fixed-width vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

/// A point written to the vector store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection when it does not exist yet.
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), MemoryError>;

    /// Insert or overwrite points by id.
    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<(), MemoryError>;
}

fn store_error(operation: &str, reason: impl ToString) -> MemoryError {
    MemoryError::Store {
        operation: operation.to_string(),
        reason: reason.to_string(),
    }
}

// ── Qdrant ──────────────────────────────────────────────────────────────

/// Qdrant over its REST API.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    /// Collections already confirmed to exist.
    known: RwLock<HashSet<String>>,
}

#[derive(Deserialize)]
struct ExistsResponse {
    result: ExistsResult,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            known: RwLock::new(HashSet::new()),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key.expose_secret()),
            None => builder,
        }
    }

    async fn send(
        &self,
        operation: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, MemoryError> {
        let response = builder.send().await.map_err(|e| store_error(operation, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(store_error(operation, format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), MemoryError> {
        if self.known.read().await.contains(name) {
            return Ok(());
        }

        let response = self
            .send(
                "collection_exists",
                self.request(reqwest::Method::GET, &format!("/collections/{name}/exists")),
            )
            .await?;
        let exists: ExistsResponse = response
            .json()
            .await
            .map_err(|e| store_error("collection_exists", e))?;

        if !exists.result.exists {
            let body = serde_json::json!({
                "vectors": {"size": dimensions, "distance": "Cosine"}
            });
            self.send(
                "create_collection",
                self.request(reqwest::Method::PUT, &format!("/collections/{name}"))
                    .json(&body),
            )
            .await?;
            tracing::info!(collection = name, dimensions, "Created vector collection");
        }

        self.known.write().await.insert(name.to_string());
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<(), MemoryError> {
        let count = points.len();
        let body = serde_json::json!({ "points": points });
        self.send(
            "upsert",
            self.request(
                reqwest::Method::PUT,
                &format!("/collections/{name}/points?wait=true"),
            )
            .json(&body),
        )
        .await?;
        tracing::debug!(collection = name, count, "Upserted points");
        Ok(())
    }
}

// ── In-memory ───────────────────────────────────────────────────────────

struct Collection {
    dimensions: usize,
    points: HashMap<Uuid, VectorPoint>,
}

/// Process-local store for tests and for running without Qdrant.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a collection's points, ordered by id.
    pub async fn points(&self, name: &str) -> Vec<VectorPoint> {
        let collections = self.collections.read().await;
        let mut points: Vec<VectorPoint> = collections
            .get(name)
            .map(|c| c.points.values().cloned().collect())
            .unwrap_or_default();
        points.sort_by_key(|p| p.id);
        points
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), MemoryError> {
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                dimensions,
                points: HashMap::new(),
            });
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<(), MemoryError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| store_error("upsert", format!("collection {name} not found")))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != collection.dimensions) {
            return Err(store_error(
                "upsert",
                format!(
                    "vector of {} dims, collection expects {}",
                    bad.vector.len(),
                    collection.dimensions
                ),
            ));
        }
        for point in points {
            collection.points.insert(point.id, point);
        }
        Ok(())
    }
}
