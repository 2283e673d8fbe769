use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of intent labels the classifier may produce.
///
/// New labels are added here and given a handler mapping + pattern set in
/// `hearth-nlp`'s intent config table, nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BookingManagement,
    CancellationRequest,
    Complaint,
    RefundRequest,
    PolicyInquiry,
    PricingInquiry,
    AvailabilityCheck,
    PaymentIssue,
    ServiceInquiry,
    ServiceDiscovery,
    Greeting,
    OutOfScope,
    UnclearIntent,
}

impl Intent {
    pub const ALL: [Intent; 13] = [
        Intent::BookingManagement,
        Intent::CancellationRequest,
        Intent::Complaint,
        Intent::RefundRequest,
        Intent::PolicyInquiry,
        Intent::PricingInquiry,
        Intent::AvailabilityCheck,
        Intent::PaymentIssue,
        Intent::ServiceInquiry,
        Intent::ServiceDiscovery,
        Intent::Greeting,
        Intent::OutOfScope,
        Intent::UnclearIntent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::BookingManagement => "booking_management",
            Intent::CancellationRequest => "cancellation_request",
            Intent::Complaint => "complaint",
            Intent::RefundRequest => "refund_request",
            Intent::PolicyInquiry => "policy_inquiry",
            Intent::PricingInquiry => "pricing_inquiry",
            Intent::AvailabilityCheck => "availability_check",
            Intent::PaymentIssue => "payment_issue",
            Intent::ServiceInquiry => "service_inquiry",
            Intent::ServiceDiscovery => "service_discovery",
            Intent::Greeting => "greeting",
            Intent::OutOfScope => "out_of_scope",
            Intent::UnclearIntent => "unclear_intent",
        }
    }

    pub fn parse(label: &str) -> Option<Intent> {
        Intent::ALL
            .iter()
            .copied()
            .find(|intent| intent.as_str() == label.trim())
    }

    /// Intents that run the slot-filling loop before their handler executes.
    pub fn is_transactional(&self) -> bool {
        matches!(
            self,
            Intent::BookingManagement
                | Intent::CancellationRequest
                | Intent::Complaint
                | Intent::RefundRequest
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a classification was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Pattern,
    Llm,
    Fallback,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationMethod::Pattern => "pattern",
            ClassificationMethod::Llm => "llm",
            ClassificationMethod::Fallback => "fallback",
        }
    }
}

/// One detected intent with its confidence and any entities the tier that
/// produced it extracted along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentScore {
    pub intent: Intent,
    pub confidence: f32,
    #[serde(default)]
    pub entities: HashMap<String, serde_json::Value>,
}

/// Full classification result for one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub primary: Intent,
    /// All detected intents, confidence descending. Always contains at least
    /// the primary.
    pub intents: Vec<IntentScore>,
    pub method: ClassificationMethod,
    pub requires_clarification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,
}

impl ClassifiedIntent {
    /// Fallback classification used when the LLM tier fails outright.
    pub fn unclear(reason: impl Into<String>) -> Self {
        Self {
            primary: Intent::UnclearIntent,
            intents: vec![IntentScore {
                intent: Intent::UnclearIntent,
                confidence: 0.0,
                entities: HashMap::new(),
            }],
            method: ClassificationMethod::Fallback,
            requires_clarification: true,
            clarification_reason: Some(reason.into()),
            context_summary: None,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.intents
            .iter()
            .find(|score| score.intent == self.primary)
            .map(|score| score.confidence)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_roundtrip_through_parse() {
        for intent in Intent::ALL {
            assert_eq!(Intent::parse(intent.as_str()), Some(intent));
        }
        assert_eq!(Intent::parse("no_such_intent"), None);
    }

    #[test]
    fn serde_uses_snake_case_labels() {
        let json = serde_json::to_string(&Intent::BookingManagement).unwrap();
        assert_eq!(json, "\"booking_management\"");
        let back: Intent = serde_json::from_str("\"policy_inquiry\"").unwrap();
        assert_eq!(back, Intent::PolicyInquiry);
    }

    #[test]
    fn unclear_fallback_requires_clarification() {
        let fallback = ClassifiedIntent::unclear("llm unavailable");
        assert_eq!(fallback.primary, Intent::UnclearIntent);
        assert_eq!(fallback.confidence(), 0.0);
        assert!(fallback.requires_clarification);
        assert_eq!(fallback.method, ClassificationMethod::Fallback);
    }
}
