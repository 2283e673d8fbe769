//! TTL cache for guardrail results.
//!
//! Pure guardrails (validation, PII, toxicity) produce the same result for
//! the same text, so duplicate inputs within the TTL window skip the scan.
//! Rate-limiter results are never cached; its `cacheable()` returns false.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::manager::GuardrailContext;
use crate::result::GuardrailResult;

const CACHE_CAPACITY: usize = 1024;

struct CachedEntry {
    result: GuardrailResult,
    inserted_at: Instant,
}

pub struct GuardrailCache {
    entries: LruCache<String, CachedEntry>,
    ttl: Duration,
}

impl GuardrailCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap()),
            ttl,
        }
    }

    /// Cache key over the guardrail name, the text, and the context fields
    /// that influence a pure check. User identity is excluded: pure results
    /// don't depend on who sent the text.
    pub fn key(guardrail_name: &str, text: &str, ctx: &GuardrailContext) -> String {
        let mut hasher = Sha256::new();
        hasher.update(guardrail_name.as_bytes());
        hasher.update([0]);
        hasher.update(text.as_bytes());
        hasher.update([0]);
        hasher.update(ctx.channel.as_deref().unwrap_or("").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&mut self, key: &str) -> Option<GuardrailResult> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.result.clone())
    }

    pub fn put(&mut self, key: String, result: GuardrailResult) {
        self.entries.put(
            key,
            CachedEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::GuardrailResult;

    #[test]
    fn hit_within_ttl_miss_after_expiry() {
        let mut cache = GuardrailCache::new(Duration::from_millis(20));
        let ctx = GuardrailContext::default();
        let key = GuardrailCache::key("pii_detector", "hello", &ctx);

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), GuardrailResult::allow("pii_detector", "clean"));
        assert!(cache.get(&key).is_some());

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn key_varies_with_text_and_guardrail() {
        let ctx = GuardrailContext::default();
        let a = GuardrailCache::key("pii_detector", "hello", &ctx);
        let b = GuardrailCache::key("pii_detector", "world", &ctx);
        let c = GuardrailCache::key("toxic_content_detector", "hello", &ctx);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
