//! Text embeddings behind the [`Embedder`] capability.
//!
//! Production posts to a hosted embedding endpoint; without one configured,
//! the deterministic feature-hashing embedder stands in so retrieval still
//! works offline and in tests. All vectors are L2-normalized, so similarity
//! reduces to a dot product.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use hearth_config::EmbeddingConfig;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding transport error: {0}")]
    Transport(String),
    #[error("embedding request failed ({status}): {message}")]
    Failed { status: u16, message: String },
    #[error("embedding response malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderInfo {
    pub model_name: String,
    pub dimension: usize,
    pub normalized: bool,
    pub backend: String,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Batch embedding; implementations chunk internally as needed.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    fn dimension(&self) -> usize;

    fn info(&self) -> EmbedderInfo;
}

/// Cosine similarity. Normalized inputs make this a plain dot product, but
/// compute defensively for callers holding unnormalized vectors.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

pub fn batch_similarity(query: &[f32], documents: &[Vec<f32>]) -> Vec<f32> {
    documents.iter().map(|doc| similarity(query, doc)).collect()
}

// ── Deterministic local embedder ──────────────────────────────────────────────

/// Feature-hashing bag-of-words embedder: each token and character trigram
/// hashes into a fixed-dimension vector, which is then L2-normalized.
/// Deterministic across runs (FNV-1a, no RandomState).
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let slot = (fnv1a(token.as_bytes()) as usize) % self.dimension;
            vector[slot] += 1.0;

            let chars: Vec<char> = token.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let slot = (fnv1a(trigram.as_bytes()) as usize) % self.dimension;
                vector[slot] += 0.5;
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_one(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            model_name: "feature-hash".to_string(),
            dimension: self.dimension,
            normalized: true,
            backend: "local".to_string(),
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn l2_normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

// ── Hosted embedder ───────────────────────────────────────────────────────────

/// OpenAI-compatible `/embeddings` client with internal batching.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| EmbedError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let endpoint = format!("{}/embeddings", self.base_url);
        let payload = json!({ "model": self.model, "input": texts });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| EmbedError::Transport(error.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|error| EmbedError::Transport(error.to_string()))?;
        if !status.is_success() {
            return Err(EmbedError::Failed {
                status: status.as_u16(),
                message: body.to_string(),
            });
        }

        let data = body
            .get("data")
            .and_then(|data| data.as_array())
            .ok_or_else(|| EmbedError::Malformed("missing data array".to_string()))?;
        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let values = item
                .get("embedding")
                .and_then(|embedding| embedding.as_array())
                .ok_or_else(|| EmbedError::Malformed("missing embedding values".to_string()))?;
            let mut vector: Vec<f32> = values
                .iter()
                .filter_map(|value| value.as_f64())
                .map(|value| value as f32)
                .collect();
            l2_normalize(&mut vector);
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vectors = self.embed_chunk(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Malformed("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_chunk(chunk).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            model_name: self.model.clone(),
            dimension: self.dimension,
            normalized: true,
            backend: "http".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedding_is_deterministic_and_self_similar() {
        let embedder = HashEmbedder::new(384);
        let a = embedder.embed("refund policy for cancelled bookings").await.unwrap();
        let b = embedder.embed("refund policy for cancelled bookings").await.unwrap();
        assert_eq!(a, b);
        assert!(similarity(&a, &b) >= 0.999);
        assert_eq!(a.len(), 384);
    }

    #[tokio::test]
    async fn vectors_are_normalized() {
        let embedder = HashEmbedder::new(384);
        let vector = embedder.embed("hello world").await.unwrap();
        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn related_texts_score_higher_than_unrelated() {
        let embedder = HashEmbedder::new(384);
        let query = embedder.embed("cancellation refund policy").await.unwrap();
        let related = embedder
            .embed("our refund policy covers cancellation charges")
            .await
            .unwrap();
        let unrelated = embedder.embed("weather forecast sunny sky").await.unwrap();
        assert!(similarity(&query, &related) > similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn batch_matches_single() {
        let embedder = HashEmbedder::new(64);
        let single = embedder.embed("one").await.unwrap();
        let batch = embedder
            .embed_batch(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], single);
    }

    #[test]
    fn similarity_handles_degenerate_inputs() {
        assert_eq!(similarity(&[], &[]), 0.0);
        assert_eq!(similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn batch_similarity_orders_like_individual_calls() {
        let query = vec![1.0, 0.0];
        let docs = vec![vec![0.9, 0.1], vec![0.0, 1.0]];
        let scores = batch_similarity(&query, &docs);
        assert!(scores[0] > scores[1]);
    }
}
