use serde::{Deserialize, Serialize};

/// What a single guardrail wants done with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Allow,
    Sanitize,
    Block,
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Outcome of one guardrail over one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub guardrail_name: String,
    pub action: Action,
    pub passed: bool,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    /// Present when `action == Sanitize`: the full message with the offending
    /// spans masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitized_text: Option<String>,
    pub latency_ms: u64,
}

impl GuardrailResult {
    pub fn allow(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            guardrail_name: name.into(),
            action: Action::Allow,
            passed: true,
            severity: Severity::Low,
            message: message.into(),
            details: serde_json::Value::Null,
            sanitized_text: None,
            latency_ms: 0,
        }
    }

    pub fn block(
        name: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            guardrail_name: name.into(),
            action: Action::Block,
            passed: false,
            severity,
            message: message.into(),
            details,
            sanitized_text: None,
            latency_ms: 0,
        }
    }

    pub fn sanitize(
        name: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        sanitized_text: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            guardrail_name: name.into(),
            action: Action::Sanitize,
            passed: false,
            severity,
            message: message.into(),
            details,
            sanitized_text: Some(sanitized_text.into()),
            latency_ms: 0,
        }
    }

    pub fn flag(
        name: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            guardrail_name: name.into(),
            action: Action::Flag,
            passed: true,
            severity,
            message: message.into(),
            details,
            sanitized_text: None,
            latency_ms: 0,
        }
    }
}

/// Aggregated verdict over one check (input or output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailReport {
    pub results: Vec<GuardrailResult>,
    pub final_action: Action,
    /// The text the rest of the pipeline should use: the original on ALLOW,
    /// the masked text on SANITIZE, the fallback message on BLOCK.
    pub final_text: String,
    pub is_blocked: bool,
    pub total_latency_ms: u64,
}

impl GuardrailReport {
    /// Reduce individual results into a final verdict.
    ///
    /// BLOCK wins outright; otherwise the highest-severity SANITIZE supplies
    /// the replacement text; otherwise the original text passes through
    /// (FLAG results ride along in `results` without altering it).
    pub fn reduce(original: &str, results: Vec<GuardrailResult>, total_latency_ms: u64) -> Self {
        if let Some(blocked) = results
            .iter()
            .filter(|result| result.action == Action::Block)
            .max_by_key(|result| result.severity)
        {
            let final_text = blocked.message.clone();
            return Self {
                results,
                final_action: Action::Block,
                final_text,
                is_blocked: true,
                total_latency_ms,
            };
        }

        let sanitized = results
            .iter()
            .filter(|result| result.action == Action::Sanitize)
            .max_by_key(|result| result.severity)
            .and_then(|result| result.sanitized_text.clone());
        if let Some(text) = sanitized {
            return Self {
                results,
                final_action: Action::Sanitize,
                final_text: text,
                is_blocked: false,
                total_latency_ms,
            };
        }

        Self {
            results,
            final_action: Action::Allow,
            final_text: original.to_string(),
            is_blocked: false,
            total_latency_ms,
        }
    }
}
