//! Vector store client: namespaced upsert/query/delete over a swappable
//! backend.
//!
//! Namespaces isolate logical corpora (`policies`, `documents`). Metadata is
//! JSON and filterable by equality. The HTTP backend speaks a Pinecone-style
//! REST API; the in-memory backend serves tests and keyless development.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use hearth_config::VectorStoreConfig;

use crate::embed::{Embedder, similarity};

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    #[error("vector store rejected request ({status}): {message}")]
    BadRequest { status: u16, message: String },
    #[error("embedding failed: {0}")]
    Embedding(#[from] crate::embed::EmbedError),
    #[error("document missing field `{0}`")]
    MissingField(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk_id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub text_preview: String,
}

/// Equality-only metadata filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilter(pub HashMap<String, serde_json::Value>);

impl MetadataFilter {
    pub fn equals(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self(HashMap::from([(key.into(), value)]))
    }

    pub fn matches(&self, metadata: &serde_json::Map<String, serde_json::Value>) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHealth {
    pub dimension: usize,
    /// Fraction of index capacity in use, 0.0 – 1.0.
    pub fullness: f32,
    pub namespaces: HashMap<String, usize>,
}

#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn upsert(
        &self,
        namespace: &str,
        points: Vec<VectorPoint>,
    ) -> Result<usize, VectorStoreError>;

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>, VectorStoreError>;

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<usize, VectorStoreError>;

    async fn delete_by_filter(
        &self,
        namespace: &str,
        filter: &MetadataFilter,
    ) -> Result<usize, VectorStoreError>;

    async fn health(&self) -> Result<IndexHealth, VectorStoreError>;
}

// ── In-memory backend ─────────────────────────────────────────────────────────

pub struct MemoryVectorStore {
    dimension: usize,
    namespaces: RwLock<HashMap<String, HashMap<String, VectorPoint>>>,
}

impl MemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            namespaces: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorBackend for MemoryVectorStore {
    async fn upsert(
        &self,
        namespace: &str,
        points: Vec<VectorPoint>,
    ) -> Result<usize, VectorStoreError> {
        let mut namespaces = self.namespaces.write().await;
        let space = namespaces.entry(namespace.to_string()).or_default();
        let count = points.len();
        for point in points {
            space.insert(point.id.clone(), point);
        }
        Ok(count)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>, VectorStoreError> {
        let namespaces = self.namespaces.read().await;
        let Some(space) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<RetrievalHit> = space
            .values()
            .filter(|point| filter.map(|f| f.matches(&point.metadata)).unwrap_or(true))
            .map(|point| RetrievalHit {
                chunk_id: point.id.clone(),
                score: similarity(vector, &point.vector).max(0.0),
                text_preview: point
                    .metadata
                    .get("text_preview")
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_string(),
                metadata: point.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<usize, VectorStoreError> {
        let mut namespaces = self.namespaces.write().await;
        let Some(space) = namespaces.get_mut(namespace) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            if space.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_by_filter(
        &self,
        namespace: &str,
        filter: &MetadataFilter,
    ) -> Result<usize, VectorStoreError> {
        let mut namespaces = self.namespaces.write().await;
        let Some(space) = namespaces.get_mut(namespace) else {
            return Ok(0);
        };
        let before = space.len();
        space.retain(|_, point| !filter.matches(&point.metadata));
        Ok(before - space.len())
    }

    async fn health(&self) -> Result<IndexHealth, VectorStoreError> {
        let namespaces = self.namespaces.read().await;
        Ok(IndexHealth {
            dimension: self.dimension,
            fullness: 0.0,
            namespaces: namespaces
                .iter()
                .map(|(name, space)| (name.clone(), space.len()))
                .collect(),
        })
    }
}

// ── HTTP backend ──────────────────────────────────────────────────────────────

/// Pinecone-style REST backend.
pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpVectorStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| VectorStoreError::Unavailable(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, VectorStoreError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Api-Key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| VectorStoreError::Unavailable(error.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|error| VectorStoreError::Unavailable(error.to_string()))?;
        if !status.is_success() {
            return Err(VectorStoreError::BadRequest {
                status: status.as_u16(),
                message: body.to_string(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl VectorBackend for HttpVectorStore {
    async fn upsert(
        &self,
        namespace: &str,
        points: Vec<VectorPoint>,
    ) -> Result<usize, VectorStoreError> {
        let vectors: Vec<serde_json::Value> = points
            .iter()
            .map(|point| {
                json!({
                    "id": point.id,
                    "values": point.vector,
                    "metadata": point.metadata,
                })
            })
            .collect();
        let body = self
            .post("/vectors/upsert", json!({"vectors": vectors, "namespace": namespace}))
            .await?;
        Ok(body
            .get("upsertedCount")
            .and_then(|count| count.as_u64())
            .unwrap_or(points.len() as u64) as usize)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>, VectorStoreError> {
        let mut payload = json!({
            "vector": vector,
            "topK": top_k,
            "namespace": namespace,
            "includeMetadata": true,
        });
        if let Some(filter) = filter {
            payload["filter"] = serde_json::to_value(&filter.0).unwrap_or_default();
        }
        let body = self.post("/query", payload).await?;

        let matches = body
            .get("matches")
            .and_then(|matches| matches.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(matches
            .into_iter()
            .filter_map(|hit| {
                let metadata = hit
                    .get("metadata")
                    .and_then(|metadata| metadata.as_object())
                    .cloned()
                    .unwrap_or_default();
                Some(RetrievalHit {
                    chunk_id: hit.get("id")?.as_str()?.to_string(),
                    score: hit.get("score").and_then(|score| score.as_f64()).unwrap_or(0.0)
                        as f32,
                    text_preview: metadata
                        .get("text_preview")
                        .and_then(|value| value.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    metadata,
                })
            })
            .collect())
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<usize, VectorStoreError> {
        self.post("/vectors/delete", json!({"ids": ids, "namespace": namespace}))
            .await?;
        Ok(ids.len())
    }

    async fn delete_by_filter(
        &self,
        namespace: &str,
        filter: &MetadataFilter,
    ) -> Result<usize, VectorStoreError> {
        self.post(
            "/vectors/delete",
            json!({"filter": filter.0, "namespace": namespace}),
        )
        .await?;
        Ok(0)
    }

    async fn health(&self) -> Result<IndexHealth, VectorStoreError> {
        let body = self.post("/describe_index_stats", json!({})).await?;
        let namespaces = body
            .get("namespaces")
            .and_then(|namespaces| namespaces.as_object())
            .map(|namespaces| {
                namespaces
                    .iter()
                    .map(|(name, stats)| {
                        (
                            name.clone(),
                            stats
                                .get("vectorCount")
                                .and_then(|count| count.as_u64())
                                .unwrap_or(0) as usize,
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(IndexHealth {
            dimension: body
                .get("dimension")
                .and_then(|dimension| dimension.as_u64())
                .unwrap_or(0) as usize,
            fullness: body
                .get("indexFullness")
                .and_then(|fullness| fullness.as_f64())
                .unwrap_or(0.0) as f32,
            namespaces,
        })
    }
}

// ── High-level client ─────────────────────────────────────────────────────────

const TEXT_PREVIEW_CHARS: usize = 200;

/// Composes an embedder with a backend: documents in, ranked hits out.
pub struct VectorStoreClient {
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn VectorBackend>,
}

impl VectorStoreClient {
    pub fn new(embedder: Arc<dyn Embedder>, backend: Arc<dyn VectorBackend>) -> Self {
        Self { embedder, backend }
    }

    /// Embed `text_field` of each document and upsert. Every other field of
    /// the document lands in metadata, plus the full text and a short
    /// preview. A failed batch fails the whole call; callers retry.
    pub async fn upsert_documents(
        &self,
        documents: &[serde_json::Value],
        namespace: &str,
        id_field: &str,
        text_field: &str,
    ) -> Result<usize, VectorStoreError> {
        let mut ids = Vec::with_capacity(documents.len());
        let mut texts = Vec::with_capacity(documents.len());
        for document in documents {
            let id = document
                .get(id_field)
                .and_then(|value| value.as_str())
                .ok_or_else(|| VectorStoreError::MissingField(id_field.to_string()))?;
            let text = document
                .get(text_field)
                .and_then(|value| value.as_str())
                .ok_or_else(|| VectorStoreError::MissingField(text_field.to_string()))?;
            ids.push(id.to_string());
            texts.push(text.to_string());
        }

        let vectors = self.embedder.embed_batch(&texts).await?;

        let points: Vec<VectorPoint> = documents
            .iter()
            .zip(ids)
            .zip(texts)
            .zip(vectors)
            .map(|(((document, id), text), vector)| {
                let mut metadata = document
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                metadata.remove(id_field);
                metadata.insert(
                    "text_preview".to_string(),
                    json!(truncate_chars(&text, TEXT_PREVIEW_CHARS)),
                );
                metadata.insert("text".to_string(), json!(text));
                VectorPoint {
                    id,
                    vector,
                    metadata,
                }
            })
            .collect();

        let upserted = self.backend.upsert(namespace, points).await?;
        info!(namespace, upserted, "documents upserted into vector store");
        Ok(upserted)
    }

    pub async fn query_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>, VectorStoreError> {
        self.backend.query(namespace, vector, top_k, filter).await
    }

    pub async fn query_by_text(
        &self,
        text: &str,
        top_k: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>, VectorStoreError> {
        let vector = self.embedder.embed(text).await?;
        let hits = self.backend.query(namespace, &vector, top_k, filter).await?;
        debug!(namespace, hits = hits.len(), "vector query complete");
        Ok(hits)
    }

    pub async fn delete(&self, ids: &[String], namespace: &str) -> Result<usize, VectorStoreError> {
        self.backend.delete(namespace, ids).await
    }

    pub async fn delete_by_filter(
        &self,
        filter: &MetadataFilter,
        namespace: &str,
    ) -> Result<usize, VectorStoreError> {
        self.backend.delete_by_filter(namespace, filter).await
    }

    pub async fn health_check(&self) -> Result<IndexHealth, VectorStoreError> {
        self.backend.health().await
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit).collect();
    format!("{truncated}…")
}
