//! Output-side guardrails: PII leakage, toxicity, and unauthorized
//! commitment language in generated responses.

use async_trait::async_trait;

use hearth_config::PiiConfig;

use crate::manager::{Guardrail, GuardrailContext};
use crate::patterns::{COMMITMENT_PATTERNS, UNAUTHORIZED_PRICING_PATTERNS};
use crate::pii::evaluate_pii_guard;
use crate::result::{GuardrailResult, Severity};

/// Scans model output for the same PII families as the input detector.
/// Sanitize is preferred so the reply still reaches the user.
pub struct PiiLeakageDetector {
    config: PiiConfig,
}

impl PiiLeakageDetector {
    pub fn new(config: PiiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Guardrail for PiiLeakageDetector {
    fn name(&self) -> &'static str {
        "pii_leakage_detector"
    }

    async fn check(&self, text: &str, _ctx: &GuardrailContext) -> GuardrailResult {
        evaluate_pii_guard(self.name(), text, &self.config)
    }
}

/// Flags promise/guarantee phrasing and unauthorized pricing offers in
/// generated text. Flag-only: ops review the transcript, the reply ships.
pub struct UnauthorizedCommitmentDetector;

#[async_trait]
impl Guardrail for UnauthorizedCommitmentDetector {
    fn name(&self) -> &'static str {
        "commitment_detector"
    }

    async fn check(&self, text: &str, _ctx: &GuardrailContext) -> GuardrailResult {
        let commitments: Vec<&str> = COMMITMENT_PATTERNS
            .iter()
            .chain(UNAUTHORIZED_PRICING_PATTERNS.iter())
            .filter_map(|pattern| pattern.find(text).map(|m| m.as_str()))
            .collect();

        if commitments.is_empty() {
            GuardrailResult::allow(self.name(), "no commitment language")
        } else {
            GuardrailResult::flag(
                self.name(),
                Severity::Medium,
                "response contains commitment or pricing language",
                serde_json::json!({"matched": commitments}),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Action;

    #[tokio::test]
    async fn leaked_pii_is_sanitized() {
        let detector = PiiLeakageDetector::new(PiiConfig::default());
        let result = detector
            .check(
                "Your technician's number is 987-654-3210.",
                &GuardrailContext::default(),
            )
            .await;
        assert_eq!(result.action, Action::Sanitize);
        assert!(!result.sanitized_text.unwrap().contains("987-654-3210"));
    }

    #[tokio::test]
    async fn commitments_are_flagged_not_blocked() {
        let detector = UnauthorizedCommitmentDetector;
        let result = detector
            .check(
                "I guarantee the plumber arrives by 9am, with a special price!",
                &GuardrailContext::default(),
            )
            .await;
        assert_eq!(result.action, Action::Flag);
        assert!(result.passed);

        let result = detector
            .check("A plumber is scheduled for tomorrow.", &GuardrailContext::default())
            .await;
        assert_eq!(result.action, Action::Allow);
    }
}
