use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use hearth_config::LlmConfig;

// ── Chat message types ────────────────────────────────────────────────────────

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation, in the OpenAI-compatible
/// `/chat/completions` shape the hosted model speaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    /// 503 / 429 / overloaded / rate-limit / quota. Worth retrying.
    #[error("transient llm failure ({status}): {message}")]
    Transient { status: u16, message: String },
    /// Any other HTTP failure; surfaces immediately.
    #[error("llm request failed ({status}): {message}")]
    Permanent { status: u16, message: String },
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm response missing content")]
    EmptyResponse,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Transient { .. })
    }
}

/// Classify a failed HTTP response. Retries are reserved for overload-shaped
/// failures; everything else is permanent.
fn classify_failure(status: u16, body: &str) -> LlmError {
    let lowered = body.to_lowercase();
    let overloaded = status == 503
        || status == 429
        || lowered.contains("overloaded")
        || lowered.contains("rate limit")
        || lowered.contains("quota");
    if overloaded {
        LlmError::Transient { status, message: body.to_string() }
    } else {
        LlmError::Permanent { status, message: body.to_string() }
    }
}

// ── Generation parameters ─────────────────────────────────────────────────────

/// Sampling parameters for one completion call.
///
/// Three presets mirror the tasks the core performs: classification and
/// extraction run cold and short, generation runs warmer and longer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl GenerationParams {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            top_k: config.top_k,
        }
    }

    pub fn for_classification(config: &LlmConfig) -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 512,
            ..Self::from_config(config)
        }
    }

    pub fn for_extraction(config: &LlmConfig) -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 256,
            ..Self::from_config(config)
        }
    }

    pub fn for_generation(config: &LlmConfig) -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            ..Self::from_config(config)
        }
    }
}

// ── ChatModel capability ──────────────────────────────────────────────────────

/// Single-shot chat completion. Implemented by [`HttpChatModel`] in
/// production and by scripted stand-ins in tests.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, LlmError>;
}

// ── HTTP client ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": params.model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "top_p": params.top_p,
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|error| LlmError::Transport(format!("invalid response body: {error}")))?;
        parsed
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(ToString::to_string)
            .ok_or(LlmError::EmptyResponse)
    }
}

// ── Retry wrapper ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retry_attempts,
            ..Self::default()
        }
    }
}

/// Wraps any [`ChatModel`] with exponential-backoff retries on transient
/// failures. Permanent failures surface on the first attempt.
pub struct Retrying<M> {
    inner: M,
    policy: RetryPolicy,
}

impl<M: ChatModel> Retrying<M> {
    pub fn new(inner: M, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<M: ChatModel> ChatModel for Retrying<M> {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 0;
        loop {
            match self.inner.complete(messages, params).await {
                Ok(content) => return Ok(content),
                Err(error) if error.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient llm failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= self.policy.backoff_factor;
                }
                Err(error) => {
                    debug!(attempt, %error, "llm call failed terminally");
                    return Err(error);
                }
            }
        }
    }
}

// ── Constrained JSON extraction ───────────────────────────────────────────────

/// Extract the first valid JSON value from an LLM response.
///
/// Looks for a fenced ```json block first, then falls back to the outermost
/// bare `{...}` object. Returns `None` when neither parses; callers always
/// have a deterministic fallback, the model's output shape is never trusted.
pub fn extract_json<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    let trimmed = response.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                let candidate = &trimmed[start..=end];
                if let Ok(val) = serde_json::from_str(candidate) {
                    return Some(val);
                }
            }
        }
    }

    None
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    struct Parsed {
        #[serde(default)]
        primary_intent: Option<String>,
        #[serde(default)]
        confidence: Option<f32>,
    }

    // ── extract_json ───────────────────────────────────────────────────────

    #[test]
    fn extract_fenced_json() {
        let raw = "Sure!\n```json\n{\"primary_intent\":\"greeting\",\"confidence\":0.9}\n```";
        let out = extract_json::<Parsed>(raw).unwrap();
        assert_eq!(out.primary_intent.as_deref(), Some("greeting"));
    }

    #[test]
    fn extract_bare_json_with_surrounding_text() {
        let raw = "some preamble {\"primary_intent\":\"complaint\"} some epilogue";
        let out = extract_json::<Parsed>(raw).unwrap();
        assert_eq!(out.primary_intent.as_deref(), Some("complaint"));
    }

    #[test]
    fn extract_fenced_takes_precedence_over_bare() {
        let raw = "Bare: {\"primary_intent\":\"wrong\"}\n```json\n{\"primary_intent\":\"right\"}\n```";
        let out = extract_json::<Parsed>(raw).unwrap();
        assert_eq!(out.primary_intent.as_deref(), Some("right"));
    }

    #[test]
    fn extract_returns_none_for_plain_text() {
        assert!(extract_json::<Parsed>("no structure here").is_none());
        assert!(extract_json::<Parsed>("").is_none());
    }

    #[test]
    fn extract_returns_none_for_malformed_fence() {
        let raw = "```json\n{not valid json}\n```";
        assert!(extract_json::<Parsed>(raw).is_none());
    }

    // ── failure classification ─────────────────────────────────────────────

    #[test]
    fn overload_statuses_are_transient() {
        assert!(classify_failure(503, "service unavailable").is_retryable());
        assert!(classify_failure(429, "too many requests").is_retryable());
        assert!(classify_failure(500, "model is overloaded").is_retryable());
        assert!(classify_failure(400, "Rate Limit reached").is_retryable());
        assert!(classify_failure(403, "quota exceeded").is_retryable());
    }

    #[test]
    fn other_failures_are_permanent() {
        assert!(!classify_failure(400, "bad request").is_retryable());
        assert!(!classify_failure(401, "invalid key").is_retryable());
        assert!(!classify_failure(404, "no such model").is_retryable());
    }

    // ── presets ────────────────────────────────────────────────────────────

    #[test]
    fn task_presets_override_sampling() {
        let config = LlmConfig::default();
        let classify = GenerationParams::for_classification(&config);
        assert!((classify.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(classify.max_tokens, 512);

        let extract = GenerationParams::for_extraction(&config);
        assert!((extract.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(extract.max_tokens, 256);

        let generate = GenerationParams::for_generation(&config);
        assert!((generate.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(generate.max_tokens, 1024);
        assert_eq!(generate.model, config.model);
    }

    // ── retry wrapper ──────────────────────────────────────────────────────

    /// Fails with the given error `failures` times, then succeeds.
    struct Flaky {
        failures: AtomicU32,
        transient: bool,
    }

    #[async_trait]
    impl ChatModel for Flaky {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<String, LlmError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            }).is_ok()
            {
                if self.transient {
                    Err(LlmError::Transient { status: 503, message: "overloaded".into() })
                } else {
                    Err(LlmError::Permanent { status: 400, message: "bad request".into() })
                }
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn params() -> GenerationParams {
        GenerationParams::from_config(&LlmConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let model = Retrying::new(
            Flaky { failures: AtomicU32::new(2), transient: true },
            RetryPolicy::default(),
        );
        let out = model.complete(&[ChatMessage::user("hi")], &params()).await;
        assert_eq!(out.unwrap(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let model = Retrying::new(
            Flaky { failures: AtomicU32::new(10), transient: true },
            RetryPolicy::default(),
        );
        let out = model.complete(&[ChatMessage::user("hi")], &params()).await;
        assert!(matches!(out, Err(LlmError::Transient { .. })));
    }

    #[tokio::test]
    async fn permanent_failures_surface_immediately() {
        let model = Retrying::new(
            Flaky { failures: AtomicU32::new(1), transient: false },
            RetryPolicy::default(),
        );
        let out = model.complete(&[ChatMessage::user("hi")], &params()).await;
        assert!(matches!(out, Err(LlmError::Permanent { .. })));
    }
}
