use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat-completion endpoint (OpenAI-compatible `/chat/completions`).
    pub base_url: String,
    /// Overridden at runtime by `HEARTH_LLM_API_KEY` when set.
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_retry_attempts: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 0.95,
            top_k: 40,
            max_retry_attempts: 3,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding endpoint; empty means the local deterministic embedder.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub normalize: bool,
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
            normalize: true,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Index endpoint; empty means the in-memory store.
    pub base_url: String,
    pub api_key: String,
    pub index_name: String,
    pub request_timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            index_name: "hearth-docs".to_string(),
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in tokens.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in tokens.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputValidatorConfig {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for InputValidatorConfig {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiConfig {
    pub mask_pii: bool,
    pub detect_email: bool,
    pub detect_phone: bool,
    pub detect_ssn: bool,
    pub detect_credit_card: bool,
    pub detect_aadhaar: bool,
    pub detect_pan: bool,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            mask_pii: true,
            detect_email: true,
            detect_phone: true,
            detect_ssn: true,
            detect_credit_card: true,
            detect_aadhaar: true,
            detect_pan: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToxicityConfig {
    /// Number of keyword hits at which the message is blocked.
    pub threshold: usize,
}

impl Default for ToxicityConfig {
    fn default() -> Self {
        Self { threshold: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: u32,
    pub max_requests_per_hour: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 20,
            max_requests_per_hour: 100,
            burst_size: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailsConfig {
    pub input_validator_enabled: bool,
    pub pii_detector_enabled: bool,
    pub toxicity_detector_enabled: bool,
    pub prompt_injection_detector_enabled: bool,
    pub rate_limiter_enabled: bool,
    pub commitment_detector_enabled: bool,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub input_validator: InputValidatorConfig,
    pub pii: PiiConfig,
    pub toxicity: ToxicityConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            input_validator_enabled: true,
            pii_detector_enabled: true,
            toxicity_detector_enabled: true,
            prompt_injection_detector_enabled: true,
            rate_limiter_enabled: true,
            commitment_detector_enabled: true,
            cache_enabled: true,
            cache_ttl_secs: 3600,
            input_validator: InputValidatorConfig::default(),
            pii: PiiConfig::default(),
            toxicity: ToxicityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of prior messages given to the context-aware classifier.
    pub history_limit: usize,
    pub dialog_state_expiry_hours: i64,
    /// Failed attempts at one slot before the turn escalates.
    pub max_slot_attempts: u32,
    /// Business hours accepted by the TIME validator, 24h clock.
    pub business_open_hour: u32,
    pub business_close_hour: u32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            dialog_state_expiry_hours: 24,
            max_slot_attempts: 3,
            business_open_hour: 8,
            business_close_hour: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
    /// Below this top score the policy engine answers with the canned
    /// not-found reply.
    pub min_relevance: f32,
    /// Token budget for the retrieved context block.
    pub context_token_budget: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_relevance: 0.35,
            context_token_budget: 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// When set, a daily-rotated log file is written to this directory in
    /// addition to stderr.
    pub log_dir: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub chunking: ChunkingConfig,
    pub guardrails: GuardrailsConfig,
    pub conversation: ConversationConfig,
    pub rag: RagConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    /// A missing file yields the defaults (still with env applied).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        config.apply_env();
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(value) = env::var("HEARTH_LLM_API_KEY") {
            if !value.is_empty() {
                self.llm.api_key = value;
            }
        }
        if let Ok(value) = env::var("HEARTH_EMBEDDING_MODEL") {
            if !value.is_empty() {
                self.embedding.model = value;
            }
        }
        if let Ok(value) = env::var("HEARTH_VECTOR_API_KEY") {
            if !value.is_empty() {
                self.vector_store.api_key = value;
            }
        }
        if let Ok(value) = env::var("HEARTH_VECTOR_INDEX") {
            if !value.is_empty() {
                self.vector_store.index_name = value;
            }
        }
        if let Ok(value) = env::var("CONVERSATION_HISTORY_LIMIT") {
            if let Ok(parsed) = value.parse() {
                self.conversation.history_limit = parsed;
            }
        }
        if let Ok(value) = env::var("MAX_RETRY_ATTEMPTS") {
            if let Ok(parsed) = value.parse() {
                self.llm.max_retry_attempts = parsed;
            }
        }
        if let Ok(value) = env::var("DIALOG_STATE_EXPIRY_HOURS") {
            if let Ok(parsed) = value.parse() {
                self.conversation.dialog_state_expiry_hours = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.llm.max_retry_attempts, 3);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.guardrails.rate_limit.max_requests_per_minute, 20);
        assert_eq!(config.conversation.history_limit, 10);
        assert_eq!(config.conversation.dialog_state_expiry_hours, 24);
        assert!((config.rag.min_relevance - 0.35).abs() < f32::EPSILON);
    }

    #[test]
    fn toml_roundtrip_preserves_overrides() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hearth.toml");

        let mut config = AppConfig::default();
        config.llm.model = "gemini-2.5-pro".to_string();
        config.guardrails.rate_limit.burst_size = 9;
        config.save_to(&path)?;

        let raw = fs::read_to_string(&path)?;
        let loaded: AppConfig = toml::from_str(&raw)?;
        assert_eq!(loaded.llm.model, "gemini-2.5-pro");
        assert_eq!(loaded.guardrails.rate_limit.burst_size, 9);
        // Untouched sections keep their defaults.
        assert_eq!(loaded.rag.top_k, 5);
        Ok(())
    }

    #[test]
    fn partial_toml_fills_missing_sections_with_defaults() -> Result<()> {
        let raw = "[conversation]\nhistory_limit = 4\n";
        let config: AppConfig = toml::from_str(raw)?;
        assert_eq!(config.conversation.history_limit, 4);
        assert_eq!(config.conversation.dialog_state_expiry_hours, 24);
        assert_eq!(config.llm.max_tokens, 1024);
        Ok(())
    }
}
