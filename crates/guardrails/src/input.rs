//! Input-side guardrails: validation, PII, toxicity, prompt injection, and
//! rate limiting.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use hearth_config::{InputValidatorConfig, PiiConfig, RateLimitConfig, ToxicityConfig};

use crate::manager::{Guardrail, GuardrailContext};
use crate::patterns::{JAILBREAK_PATTERNS, PROMPT_INJECTION_PATTERNS, TOXIC_PATTERNS};
use crate::pii::evaluate_pii_guard;
use crate::result::{GuardrailResult, Severity};

// ── InputValidator ────────────────────────────────────────────────────────────

/// Rejects empty, whitespace-only, or out-of-bounds messages outright.
pub struct InputValidator {
    config: InputValidatorConfig,
}

impl InputValidator {
    pub fn new(config: InputValidatorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Guardrail for InputValidator {
    fn name(&self) -> &'static str {
        "input_validator"
    }

    fn must_complete(&self) -> bool {
        true
    }

    async fn check(&self, text: &str, _ctx: &GuardrailContext) -> GuardrailResult {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return GuardrailResult::block(
                self.name(),
                Severity::Low,
                "Please type a message so I can help.",
                serde_json::json!({"reason": "empty"}),
            );
        }

        let length = trimmed.chars().count();
        if length < self.config.min_length || length > self.config.max_length {
            return GuardrailResult::block(
                self.name(),
                Severity::Low,
                "That message is too long for me to process. Could you shorten it?",
                serde_json::json!({
                    "reason": "length",
                    "length": length,
                    "min_length": self.config.min_length,
                    "max_length": self.config.max_length,
                }),
            );
        }

        GuardrailResult::allow(self.name(), "input valid")
    }
}

// ── PiiDetector ───────────────────────────────────────────────────────────────

pub struct PiiDetector {
    config: PiiConfig,
}

impl PiiDetector {
    pub fn new(config: PiiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Guardrail for PiiDetector {
    fn name(&self) -> &'static str {
        "pii_detector"
    }

    async fn check(&self, text: &str, _ctx: &GuardrailContext) -> GuardrailResult {
        evaluate_pii_guard(self.name(), text, &self.config)
    }
}

// ── ToxicContentDetector ──────────────────────────────────────────────────────

/// Keyword-family toxicity check, shared between the input and output
/// pipelines (the registered name differs).
pub struct ToxicContentDetector {
    name: &'static str,
    config: ToxicityConfig,
}

impl ToxicContentDetector {
    pub fn input(config: ToxicityConfig) -> Self {
        Self {
            name: "toxic_content_detector",
            config,
        }
    }

    pub fn output(config: ToxicityConfig) -> Self {
        Self {
            name: "toxic_content_detector_output",
            config,
        }
    }
}

#[async_trait]
impl Guardrail for ToxicContentDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn check(&self, text: &str, _ctx: &GuardrailContext) -> GuardrailResult {
        let matched: usize = TOXIC_PATTERNS
            .iter()
            .map(|pattern| pattern.find_iter(text).count())
            .sum();

        if matched >= self.config.threshold.max(1) {
            return GuardrailResult::block(
                self.name,
                Severity::High,
                "I can't help with messages containing abusive language. Let's keep it respectful.",
                serde_json::json!({"matched_count": matched, "threshold": self.config.threshold}),
            );
        }

        GuardrailResult::allow(self.name, "no toxic content")
    }
}

// ── PromptInjectionDetector ───────────────────────────────────────────────────

/// Blocks instruction-override attempts; merely flags the softer jailbreak
/// signals (hypotheticals, encoding tricks) which are too broad to block on.
pub struct PromptInjectionDetector;

#[async_trait]
impl Guardrail for PromptInjectionDetector {
    fn name(&self) -> &'static str {
        "prompt_injection_detector"
    }

    async fn check(&self, text: &str, _ctx: &GuardrailContext) -> GuardrailResult {
        let injections: Vec<&str> = PROMPT_INJECTION_PATTERNS
            .iter()
            .filter_map(|pattern| pattern.find(text).map(|m| m.as_str()))
            .collect();
        if !injections.is_empty() {
            return GuardrailResult::block(
                self.name(),
                Severity::Critical,
                "I can't process that request.",
                serde_json::json!({"matched": injections}),
            );
        }

        if JAILBREAK_PATTERNS.iter().any(|pattern| pattern.is_match(text)) {
            return GuardrailResult::flag(
                self.name(),
                Severity::Medium,
                "possible jailbreak phrasing",
                serde_json::Value::Null,
            );
        }

        GuardrailResult::allow(self.name(), "no injection detected")
    }
}

// ── RateLimiter ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct UserBucket {
    minute_tokens: u32,
    minute_last_refill: Instant,
    hour_tokens: u32,
    hour_last_refill: Instant,
    total_requests: u64,
}

/// Token-bucket limiter, per user, minute and hour windows.
///
/// The only stateful guardrail: buckets live behind one async mutex so two
/// concurrent turns for the same user never observe stale counts. A missing
/// user id allows the request (this guardrail fails open).
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<i64, UserBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Guardrail for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    fn must_complete(&self) -> bool {
        true
    }

    fn cacheable(&self) -> bool {
        false
    }

    async fn check(&self, _text: &str, ctx: &GuardrailContext) -> GuardrailResult {
        let Some(user_id) = ctx.user_id else {
            return GuardrailResult::allow(self.name(), "no user_id provided");
        };

        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(user_id).or_insert_with(|| UserBucket {
            minute_tokens: self.config.max_requests_per_minute,
            minute_last_refill: now,
            hour_tokens: self.config.max_requests_per_hour,
            hour_last_refill: now,
            total_requests: 0,
        });

        let since_minute_refill = now.duration_since(bucket.minute_last_refill).as_secs();
        if since_minute_refill >= 60 {
            bucket.minute_tokens = self.config.max_requests_per_minute;
            bucket.minute_last_refill = now;
        }
        let since_hour_refill = now.duration_since(bucket.hour_last_refill).as_secs();
        if since_hour_refill >= 3600 {
            bucket.hour_tokens = self.config.max_requests_per_hour;
            bucket.hour_last_refill = now;
        }

        if bucket.minute_tokens == 0 {
            let retry_after = (60 - since_minute_refill.min(59)).max(1);
            return GuardrailResult::block(
                self.name(),
                Severity::Medium,
                format!("Too many requests, try again in {retry_after} seconds."),
                serde_json::json!({
                    "reason": "minute_limit_exceeded",
                    "max_requests_per_minute": self.config.max_requests_per_minute,
                    "retry_after_seconds": retry_after,
                }),
            );
        }

        if bucket.hour_tokens == 0 {
            let retry_after = (3600 - since_hour_refill.min(3599)).max(1);
            return GuardrailResult::block(
                self.name(),
                Severity::Medium,
                format!("Too many requests, try again in {retry_after} seconds."),
                serde_json::json!({
                    "reason": "hour_limit_exceeded",
                    "max_requests_per_hour": self.config.max_requests_per_hour,
                    "retry_after_seconds": retry_after,
                }),
            );
        }

        bucket.minute_tokens -= 1;
        bucket.hour_tokens -= 1;
        bucket.total_requests += 1;
        debug!(
            user_id,
            minute_remaining = bucket.minute_tokens,
            hour_remaining = bucket.hour_tokens,
            "rate limit check passed"
        );

        GuardrailResult::allow(self.name(), "rate limit check passed")
    }
}
