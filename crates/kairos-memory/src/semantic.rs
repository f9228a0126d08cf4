use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kairos_errors::{KairosError, KairosResult};
use kairos_protocol::{SearchResult, VectorPoint};
use parking_lot::RwLock;
use tracing::{instrument, warn};

/// Semantic memory over a vector store (§4.5): `Upsert`, `Search`,
/// `CreateCollection`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, name: &str, dim: usize) -> KairosResult<()>;
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> KairosResult<()>;
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> KairosResult<Vec<SearchResult>>;
}

/// Embeds text into vectors. `dimension` is probed once on initialize.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> KairosResult<Vec<f32>>;
    fn dimension(&self) -> usize;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// In-process vector store, useful for tests and small deployments without
/// an external vector database driver (a specific driver is a spec.md
/// Non-goal; this is the in-process fallback every embedder-backed memory
/// needs regardless).
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, (usize, Vec<VectorPoint>)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dim: usize) -> KairosResult<()> {
        self.collections
            .write()
            .entry(name.to_owned())
            .or_insert_with(|| (dim, Vec::new()));
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> KairosResult<()> {
        let mut collections = self.collections.write();
        let entry = collections
            .entry(collection.to_owned())
            .or_insert_with(|| (points.first().map(|p| p.vector.len()).unwrap_or(0), Vec::new()));
        for point in points {
            if let Some(existing) = entry.1.iter_mut().find(|p| p.id == point.id) {
                *existing = point;
            } else {
                entry.1.push(point);
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> KairosResult<Vec<SearchResult>> {
        let collections = self.collections.read();
        let Some((_, points)) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<SearchResult> = points
            .iter()
            .map(|point| SearchResult {
                id: point.id.clone(),
                score: cosine_similarity(query_vector, &point.vector),
                point: point.clone(),
            })
            .filter(|result| score_threshold.is_none_or(|threshold| result.score >= threshold))
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// Composes a vector store with an embedder (§4.5). On `initialize`, probes
/// the embedder for dimensionality and ensures the collection exists; if
/// creation fails, falls back to a probe search to detect idempotent
/// existence.
pub struct VectorMemory {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
}

impl VectorMemory {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, collection: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
        }
    }

    #[instrument(skip(self), fields(memory = %self.collection))]
    pub async fn initialize(&self) -> KairosResult<()> {
        let dim = self.embedder.dimension();
        if let Err(err) = self.store.create_collection(&self.collection, dim).await {
            warn!(collection = %self.collection, %err, "collection creation failed, probing for existing collection");
            let probe = vec![0.0_f32; dim.max(1)];
            self.store
                .search(&self.collection, &probe, 1, None)
                .await
                .map_err(|_| {
                    KairosError::memory_error(format!(
                        "collection '{}' does not exist and could not be created",
                        self.collection
                    ))
                })?;
        }
        Ok(())
    }

    pub async fn remember(&self, id: impl Into<String>, text: &str, payload: serde_json::Value) -> KairosResult<()> {
        let vector = self.embedder.embed(text).await?;
        let point = VectorPoint {
            id: id.into(),
            vector,
            payload,
            timestamp: Utc::now(),
        };
        self.store.upsert(&self.collection, vec![point]).await
    }

    pub async fn recall(&self, query: &str, limit: usize, score_threshold: Option<f32>) -> KairosResult<Vec<SearchResult>> {
        let query_vector = self.embedder.embed(query).await?;
        self.store
            .search(&self.collection, &query_vector, limit, score_threshold)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> KairosResult<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn initialize_creates_collection_then_recall_finds_upserted_point() {
        let memory = VectorMemory::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(StubEmbedder),
            "notes",
        );
        memory.initialize().await.unwrap();
        memory
            .remember("a", "hello world", serde_json::json!({"text": "hello world"}))
            .await
            .unwrap();

        let results = memory.recall("hello world", 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn search_respects_score_threshold() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![VectorPoint {
                    id: "x".into(),
                    vector: vec![1.0, 0.0],
                    payload: serde_json::Value::Null,
                    timestamp: Utc::now(),
                }],
            )
            .await
            .unwrap();

        let far = store.search("c", &[0.0, 1.0], 10, Some(0.9)).await.unwrap();
        assert!(far.is_empty());

        let close = store.search("c", &[1.0, 0.0], 10, Some(0.9)).await.unwrap();
        assert_eq!(close.len(), 1);
    }
}
