//! Best-effort extraction of profile points into a vector store.
//!
//! The trigger never reports failure to its caller. Each stage (LLM
//! extraction, parsing, embedding, upsert) returns `MemoryError` internally
//! and the outcome is logged once.

pub mod vector;

pub use vector::{Embedder, InMemoryVectorStore, QdrantStore, VectorPoint, VectorStore};

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::onboarding::model::ProfilePoint;
use crate::onboarding::prompts::{EXTRACTION_SYSTEM_PROMPT, extraction_user_prompt};

/// Fire-and-forget profile extraction for one utterance.
#[async_trait]
pub trait ProfileExtractor: Send + Sync {
    async fn extract_and_store(&self, identity: &str, utterance: &str);
}

/// Deterministic point id for `(identity, summary)`.
///
/// Re-processing the same utterance overwrites instead of duplicating.
pub fn point_id(identity: &str, summary: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update([0u8]);
    hasher.update(summary.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence pattern is valid")
});

/// Parse the extraction model's reply into validated points.
///
/// Accepts a bare JSON array, a fenced block, or an array embedded in prose.
/// Points that fail validation are dropped individually.
pub fn parse_profile_points(raw: &str) -> Result<Vec<ProfilePoint>, MemoryError> {
    let body = FENCED
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim();

    let array = match (body.find('['), body.rfind(']')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => return Err(MemoryError::Parse(format!("no JSON array in reply: {body}"))),
    };

    let items: Vec<serde_json::Value> =
        serde_json::from_str(array).map_err(|e| MemoryError::Parse(e.to_string()))?;

    let mut points = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<ProfilePoint>(item) {
            Ok(point) => match point.validate() {
                Ok(()) => points.push(point),
                Err(reason) => warn!(%reason, "Dropping invalid profile point"),
            },
            Err(e) => warn!(error = %e, "Dropping malformed profile point"),
        }
    }
    Ok(points)
}

/// LLM + embedder + vector store pipeline behind `ProfileExtractor`.
pub struct MemoryExtractor {
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl MemoryExtractor {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
            collection: collection.into(),
        }
    }

    /// Returns the number of points written.
    async fn try_extract_and_store(
        &self,
        identity: &str,
        utterance: &str,
    ) -> Result<usize, MemoryError> {
        if utterance.trim().is_empty() {
            return Ok(0);
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(extraction_user_prompt(utterance)),
        ])
        .with_temperature(0.0);
        let response = self.llm.complete(request).await?;

        let points = parse_profile_points(&response.content)?;
        if points.is_empty() {
            debug!(identity, "Nothing worth storing in utterance");
            return Ok(0);
        }

        self.store
            .ensure_collection(&self.collection, self.embedder.dimensions())
            .await?;

        let mut vectors = Vec::with_capacity(points.len());
        for point in points {
            let vector = match self.embedder.embed(&point.summary).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(identity, error = %e, "Skipping point that failed to embed");
                    continue;
                }
            };
            vectors.push(VectorPoint {
                id: point_id(identity, &point.summary),
                vector,
                payload: serde_json::json!({
                    "user_id": identity,
                    "point": point,
                }),
            });
        }

        let written = vectors.len();
        if written > 0 {
            self.store.upsert(&self.collection, vectors).await?;
        }
        Ok(written)
    }
}

#[async_trait]
impl ProfileExtractor for MemoryExtractor {
    async fn extract_and_store(&self, identity: &str, utterance: &str) {
        match self.try_extract_and_store(identity, utterance).await {
            Ok(written) => info!(identity, written, "Profile extraction finished"),
            Err(e) => warn!(identity, error = %e, "Profile extraction failed"),
        }
    }
}
