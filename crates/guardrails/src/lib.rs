//! Guardrail pipeline: pre- and post-processing checks around every turn.
//!
//! Each guardrail is a value implementing [`Guardrail`]; the
//! [`GuardrailManager`] holds ordered input and output lists and fans a check
//! out concurrently, so the pipeline costs max(individual latencies) rather
//! than their sum. Results reduce BLOCK > SANITIZE > FLAG > ALLOW.

pub mod cache;
pub mod factory;
pub mod input;
pub mod manager;
pub mod output;
pub mod patterns;
pub mod pii;
pub mod result;

pub use factory::build_guardrail_manager;
pub use input::{InputValidator, PromptInjectionDetector, RateLimiter, ToxicContentDetector};
pub use manager::{Guardrail, GuardrailContext, GuardrailManager};
pub use output::{PiiLeakageDetector, UnauthorizedCommitmentDetector};
pub use result::{Action, GuardrailReport, GuardrailResult, Severity};
