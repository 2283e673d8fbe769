//! Policy question answering: retrieve from the `policies` namespace, answer
//! grounded in what came back, and score how well-supported the answer is.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use hearth_config::RagConfig;
use hearth_llm::{ChatMessage, ChatModel, GenerationParams};

use crate::chunking::ChunkingService;
use crate::vector::{RetrievalHit, VectorStoreClient};

pub const POLICIES_NAMESPACE: &str = "policies";

const NOT_FOUND_REPLY: &str = "I couldn't find a policy that covers that. \
Could you rephrase, or ask about bookings, cancellations, refunds, or payments?";
const UNAVAILABLE_REPLY: &str = "I can't reach our policy documents right now. \
Please try again in a little while.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAnswer {
    pub response: String,
    pub grounding_score: f32,
    pub confidence: Confidence,
    pub sources: Vec<serde_json::Map<String, serde_json::Value>>,
}

pub struct PolicyRagEngine {
    vector_client: Arc<VectorStoreClient>,
    model: Option<Arc<dyn ChatModel>>,
    params: GenerationParams,
    config: RagConfig,
}

impl PolicyRagEngine {
    pub fn new(
        vector_client: Arc<VectorStoreClient>,
        model: Option<Arc<dyn ChatModel>>,
        params: GenerationParams,
        config: RagConfig,
    ) -> Self {
        Self {
            vector_client,
            model,
            params,
            config,
        }
    }

    pub async fn answer(&self, query: &str) -> PolicyAnswer {
        let hits = match self
            .vector_client
            .query_by_text(query, self.config.top_k, POLICIES_NAMESPACE, None)
            .await
        {
            Ok(hits) => hits,
            Err(error) => {
                warn!(%error, "policy retrieval failed, degrading");
                return PolicyAnswer {
                    response: UNAVAILABLE_REPLY.to_string(),
                    grounding_score: 0.0,
                    confidence: Confidence::Low,
                    sources: Vec::new(),
                };
            }
        };

        let top_score = hits.first().map(|hit| hit.score).unwrap_or(0.0);
        if top_score < self.config.min_relevance {
            info!(top_score, "no relevant policy found for query");
            return PolicyAnswer {
                response: NOT_FOUND_REPLY.to_string(),
                grounding_score: top_score,
                confidence: Confidence::Low,
                sources: Vec::new(),
            };
        }

        let grounding_score = grounding_score(&hits);
        let confidence = confidence_for(grounding_score);
        let sources: Vec<serde_json::Map<String, serde_json::Value>> = hits
            .iter()
            .map(|hit| {
                let mut metadata = hit.metadata.clone();
                // The full chunk text stays server-side; sources carry the preview.
                metadata.remove("text");
                metadata
            })
            .collect();

        let context_block = build_context_block(&hits, self.config.context_token_budget);

        let Some(model) = &self.model else {
            // No generator configured: fall back to quoting the best chunk.
            let response = hits
                .first()
                .map(|hit| hit.text_preview.clone())
                .filter(|preview| !preview.is_empty())
                .unwrap_or_else(|| NOT_FOUND_REPLY.to_string());
            return PolicyAnswer {
                response,
                grounding_score,
                confidence: Confidence::Low,
                sources,
            };
        };

        let prompt = format!(
            "You are a support assistant for a home-services marketplace. Answer\n\
             the customer's question using ONLY the policy excerpts below. If the\n\
             excerpts do not cover the question, say the policy does not cover it —\n\
             do not invent policy.\n\n\
             Policy excerpts:\n{context_block}\n\n\
             Customer question: {query}\n\n\
             Answer in a short, friendly paragraph."
        );
        let messages = [ChatMessage::user(prompt)];

        match model.complete(&messages, &self.params).await {
            Ok(response) => PolicyAnswer {
                response: response.trim().to_string(),
                grounding_score,
                confidence,
                sources,
            },
            Err(error) => {
                warn!(%error, "policy answer generation failed");
                PolicyAnswer {
                    response: UNAVAILABLE_REPLY.to_string(),
                    grounding_score,
                    confidence: Confidence::Low,
                    sources,
                }
            }
        }
    }
}

/// Mean of the top-3 retrieval scores.
fn grounding_score(hits: &[RetrievalHit]) -> f32 {
    let top: Vec<f32> = hits.iter().take(3).map(|hit| hit.score).collect();
    if top.is_empty() {
        return 0.0;
    }
    top.iter().sum::<f32>() / top.len() as f32
}

fn confidence_for(grounding_score: f32) -> Confidence {
    if grounding_score >= 0.7 {
        Confidence::High
    } else if grounding_score >= 0.5 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Concatenate chunk texts, newest-first by score, bounded by a token budget.
fn build_context_block(hits: &[RetrievalHit], token_budget: usize) -> String {
    let mut block = String::new();
    let mut used_tokens = 0usize;
    for (index, hit) in hits.iter().enumerate() {
        let text = hit
            .metadata
            .get("text")
            .and_then(|value| value.as_str())
            .unwrap_or(hit.text_preview.as_str());
        let cost = ChunkingService::count_tokens(text);
        if used_tokens + cost > token_budget && used_tokens > 0 {
            break;
        }
        block.push_str(&format!("[{}] {}\n", index + 1, text));
        used_tokens += cost;
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::vector::MemoryVectorStore;
    use hearth_llm::LlmError;

    async fn seeded_client() -> Arc<VectorStoreClient> {
        let client = Arc::new(VectorStoreClient::new(
            Arc::new(HashEmbedder::new(384)),
            Arc::new(MemoryVectorStore::new(384)),
        ));
        let documents = vec![
            serde_json::json!({"chunk_id": "p1", "text": "Refund policy: refunds for cancelled bookings are processed within 5 business days to the original payment method."}),
            serde_json::json!({"chunk_id": "p2", "text": "Cancellation policy: bookings cancelled within 2 hours of the slot incur a 10 percent fee."}),
        ];
        client
            .upsert_documents(&documents, POLICIES_NAMESPACE, "chunk_id", "text")
            .await
            .unwrap();
        client
    }

    struct Scripted(&'static str);

    #[async_trait::async_trait]
    impl ChatModel for Scripted {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    fn params() -> GenerationParams {
        GenerationParams::for_generation(&hearth_config::LlmConfig::default())
    }

    #[tokio::test]
    async fn grounded_answer_carries_sources_and_score() {
        let engine = PolicyRagEngine::new(
            seeded_client().await,
            Some(Arc::new(Scripted(
                "Refunds for cancelled bookings are processed within 5 business days.",
            ))),
            params(),
            RagConfig::default(),
        );

        let answer = engine.answer("refund for cancelled bookings").await;
        assert!(answer.response.contains("5 business days"));
        assert!(answer.grounding_score > 0.0);
        assert!(!answer.sources.is_empty());
        // Full chunk text never leaks through sources.
        assert!(answer.sources[0].get("text").is_none());
        assert!(answer.sources[0].get("text_preview").is_some());
    }

    #[tokio::test]
    async fn unrelated_query_gets_canned_low_confidence_reply() {
        let engine = PolicyRagEngine::new(
            seeded_client().await,
            Some(Arc::new(Scripted("should not be called"))),
            params(),
            RagConfig::default(),
        );

        let answer = engine.answer("What's the weather like today?").await;
        assert_eq!(answer.response, NOT_FOUND_REPLY);
        assert_eq!(answer.confidence, Confidence::Low);
        assert!(answer.grounding_score < RagConfig::default().min_relevance);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn generation_failure_degrades_gracefully() {
        struct Failing;

        #[async_trait::async_trait]
        impl ChatModel for Failing {
            async fn complete(
                &self,
                _messages: &[ChatMessage],
                _params: &GenerationParams,
            ) -> Result<String, LlmError> {
                Err(LlmError::Permanent {
                    status: 500,
                    message: "boom".into(),
                })
            }
        }

        let engine = PolicyRagEngine::new(
            seeded_client().await,
            Some(Arc::new(Failing)),
            params(),
            RagConfig::default(),
        );
        let answer = engine.answer("refund for cancelled bookings").await;
        assert_eq!(answer.response, UNAVAILABLE_REPLY);
        assert_eq!(answer.confidence, Confidence::Low);
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(confidence_for(0.8), Confidence::High);
        assert_eq!(confidence_for(0.6), Confidence::Medium);
        assert_eq!(confidence_for(0.2), Confidence::Low);
    }

    #[test]
    fn context_block_respects_token_budget() {
        let hits: Vec<RetrievalHit> = (0..5)
            .map(|index| RetrievalHit {
                chunk_id: format!("c{index}"),
                score: 0.9,
                metadata: {
                    let mut map = serde_json::Map::new();
                    map.insert("text".into(), serde_json::json!("word ".repeat(400)));
                    map
                },
                text_preview: String::new(),
            })
            .collect();
        // Each chunk is ~500 tokens; a 1000-token budget admits two.
        let block = build_context_block(&hits, 1000);
        assert!(block.contains("[1]"));
        assert!(block.contains("[2]"));
        assert!(!block.contains("[3]"));
    }
}
