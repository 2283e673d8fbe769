//! The guardrail capability and the manager that fans checks out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::GuardrailCache;
use crate::result::{GuardrailReport, GuardrailResult};

/// Per-turn context handed to every guardrail.
#[derive(Debug, Clone, Default)]
pub struct GuardrailContext {
    pub user_id: Option<i64>,
    pub channel: Option<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

impl GuardrailContext {
    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }
}

/// A single check that may allow, sanitize, block, or flag a message.
#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &'static str;

    /// Guardrails that may not be skipped when they run long. A timed-out
    /// guardrail that returns `false` here degrades to a soft ALLOW.
    fn must_complete(&self) -> bool {
        false
    }

    /// Whether results may be served from the TTL cache. Stateful guardrails
    /// (rate limiting) return false.
    fn cacheable(&self) -> bool {
        true
    }

    async fn check(&self, text: &str, ctx: &GuardrailContext) -> GuardrailResult;
}

/// Per-guardrail deadline. Exceeding it is tolerated for pure checks.
const GUARDRAIL_TIMEOUT: Duration = Duration::from_secs(2);

/// Holds the ordered input and output pipelines and runs each concurrently.
pub struct GuardrailManager {
    input_guardrails: Vec<Arc<dyn Guardrail>>,
    output_guardrails: Vec<Arc<dyn Guardrail>>,
    cache: Option<Mutex<GuardrailCache>>,
}

impl GuardrailManager {
    pub fn new() -> Self {
        Self {
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(Mutex::new(GuardrailCache::new(ttl)));
        self
    }

    pub fn register_input_guardrail(&mut self, guardrail: Arc<dyn Guardrail>) {
        self.input_guardrails.push(guardrail);
    }

    pub fn register_output_guardrail(&mut self, guardrail: Arc<dyn Guardrail>) {
        self.output_guardrails.push(guardrail);
    }

    pub async fn check_input(&self, text: &str, ctx: &GuardrailContext) -> GuardrailReport {
        self.run(&self.input_guardrails, text, ctx).await
    }

    pub async fn check_output(&self, text: &str, ctx: &GuardrailContext) -> GuardrailReport {
        self.run(&self.output_guardrails, text, ctx).await
    }

    /// Run every guardrail concurrently over the same original text, then
    /// reduce. Total latency tracks max(individual), not their sum.
    async fn run(
        &self,
        guardrails: &[Arc<dyn Guardrail>],
        text: &str,
        ctx: &GuardrailContext,
    ) -> GuardrailReport {
        let started = Instant::now();

        let checks = guardrails.iter().map(|guardrail| {
            let guardrail = Arc::clone(guardrail);
            async move {
                let check_started = Instant::now();

                let cache_key = if guardrail.cacheable() && self.cache.is_some() {
                    let key = GuardrailCache::key(guardrail.name(), text, ctx);
                    if let Some(cache) = &self.cache {
                        if let Some(hit) = cache.lock().await.get(&key) {
                            debug!(guardrail = guardrail.name(), "guardrail cache hit");
                            return hit;
                        }
                    }
                    Some(key)
                } else {
                    None
                };

                let mut result = if guardrail.must_complete() {
                    guardrail.check(text, ctx).await
                } else {
                    match tokio::time::timeout(GUARDRAIL_TIMEOUT, guardrail.check(text, ctx)).await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(
                                guardrail = guardrail.name(),
                                timeout_ms = GUARDRAIL_TIMEOUT.as_millis() as u64,
                                "guardrail timed out, soft-allowing"
                            );
                            GuardrailResult::allow(guardrail.name(), "check timed out, allowed")
                        }
                    }
                };
                result.latency_ms = check_started.elapsed().as_millis() as u64;

                if let (Some(key), Some(cache)) = (cache_key, &self.cache) {
                    cache.lock().await.put(key, result.clone());
                }
                result
            }
        });

        let results = join_all(checks).await;
        GuardrailReport::reduce(text, results, started.elapsed().as_millis() as u64)
    }
}

impl Default for GuardrailManager {
    fn default() -> Self {
        Self::new()
    }
}
