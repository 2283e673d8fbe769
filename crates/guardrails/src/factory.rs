//! Builds a [`GuardrailManager`] from configuration.

use std::sync::Arc;
use std::time::Duration;

use hearth_config::GuardrailsConfig;

use crate::input::{
    InputValidator, PiiDetector, PromptInjectionDetector, RateLimiter, ToxicContentDetector,
};
use crate::manager::GuardrailManager;
use crate::output::{PiiLeakageDetector, UnauthorizedCommitmentDetector};

/// Create a manager with every enabled guardrail registered, input pipeline
/// first, output pipeline second.
pub fn build_guardrail_manager(config: &GuardrailsConfig) -> GuardrailManager {
    let mut manager = if config.cache_enabled {
        GuardrailManager::new().with_cache(Duration::from_secs(config.cache_ttl_secs))
    } else {
        GuardrailManager::new()
    };

    if config.input_validator_enabled {
        manager.register_input_guardrail(Arc::new(InputValidator::new(
            config.input_validator.clone(),
        )));
    }
    if config.pii_detector_enabled {
        manager.register_input_guardrail(Arc::new(PiiDetector::new(config.pii.clone())));
    }
    if config.toxicity_detector_enabled {
        manager.register_input_guardrail(Arc::new(ToxicContentDetector::input(
            config.toxicity.clone(),
        )));
    }
    if config.prompt_injection_detector_enabled {
        manager.register_input_guardrail(Arc::new(PromptInjectionDetector));
    }
    if config.rate_limiter_enabled {
        manager.register_input_guardrail(Arc::new(RateLimiter::new(config.rate_limit.clone())));
    }

    if config.pii_detector_enabled {
        manager.register_output_guardrail(Arc::new(PiiLeakageDetector::new(config.pii.clone())));
    }
    if config.toxicity_detector_enabled {
        manager.register_output_guardrail(Arc::new(ToxicContentDetector::output(
            config.toxicity.clone(),
        )));
    }
    if config.commitment_detector_enabled {
        manager.register_output_guardrail(Arc::new(UnauthorizedCommitmentDetector));
    }

    manager
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::GuardrailContext;
    use crate::result::Action;

    #[tokio::test]
    async fn default_config_masks_pii_end_to_end() {
        let manager = build_guardrail_manager(&GuardrailsConfig::default());
        let ctx = GuardrailContext::for_user(1);

        let report = manager
            .check_input("My email is john@example.com and phone is 123-456-7890", &ctx)
            .await;
        assert_eq!(report.final_action, Action::Sanitize);
        assert!(!report.final_text.contains("john@example.com"));
        assert!(!report.final_text.contains("123-456-7890"));
        assert!(report.final_text.contains("j***@example.com"));
        assert!(report.final_text.contains("***-***-7890"));
    }

    #[tokio::test]
    async fn toxic_output_is_blocked_with_fallback() {
        let manager = build_guardrail_manager(&GuardrailsConfig::default());
        let ctx = GuardrailContext::for_user(1);

        let report = manager.check_output("I hate this damn service", &ctx).await;
        assert!(report.is_blocked);
        assert_ne!(report.final_text, "I hate this damn service");
    }

    #[tokio::test]
    async fn clean_turn_passes_both_pipelines() {
        let manager = build_guardrail_manager(&GuardrailsConfig::default());
        let ctx = GuardrailContext::for_user(1);

        let report = manager.check_input("book a cleaning for tomorrow", &ctx).await;
        assert_eq!(report.final_action, Action::Allow);
        assert_eq!(report.final_text, "book a cleaning for tomorrow");

        let report = manager
            .check_output("Your cleaning is scheduled for tomorrow at 10:00.", &ctx)
            .await;
        assert_eq!(report.final_action, Action::Allow);
    }
}
