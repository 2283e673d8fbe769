//! Static intent table: the single place a new label gets its description,
//! responsible agent, required slots, and pattern-tier rules.

use std::sync::LazyLock;

use regex::Regex;

use hearth_core::{EntityType, Intent};

pub struct IntentConfig {
    pub intent: Intent,
    pub description: &'static str,
    /// Name of the handler the coordinator dispatches to.
    pub agent: &'static str,
    /// Slots the slot-filling loop collects, in asking order.
    pub required_entities: &'static [EntityType],
    /// `(pattern, base_confidence)` pairs for the fast tier. Specific
    /// patterns are listed before generic ones; the table is scanned in
    /// declaration order and order breaks confidence ties.
    patterns: &'static [(&'static str, f32)],
}

pub struct CompiledIntentConfig {
    pub config: &'static IntentConfig,
    pub patterns: Vec<(Regex, f32)>,
}

static CONFIGS: &[IntentConfig] = &[
    IntentConfig {
        intent: Intent::BookingManagement,
        description: "Create, view, or reschedule a service booking",
        agent: "booking_agent",
        required_entities: &[
            EntityType::ServiceType,
            EntityType::Date,
            EntityType::Time,
            EntityType::Location,
        ],
        patterns: &[
            (r"(?i)\b(book|schedule|reserve)\b", 0.9),
            (r"(?i)\b(appointment|reschedule)\b", 0.88),
            (r"(?i)\bneed (a|an)\b.*\b(plumber|electrician|cleaner|painter|technician)\b", 0.86),
        ],
    },
    IntentConfig {
        intent: Intent::CancellationRequest,
        description: "Cancel an existing booking",
        agent: "cancellation_agent",
        required_entities: &[EntityType::BookingId],
        patterns: &[
            (r"(?i)\bcancel (my|the|this)\b", 0.9),
            (r"(?i)\b(want|need|like) to cancel\b", 0.9),
            (r"(?i)^cancel\b", 0.88),
        ],
    },
    IntentConfig {
        intent: Intent::Complaint,
        description: "Report a problem with a completed or ongoing service",
        agent: "complaint_agent",
        required_entities: &[EntityType::IssueType],
        patterns: &[
            (r"(?i)\b(complain|complaint)\b", 0.9),
            (r"(?i)\b(terrible|awful|horrible|worst|pathetic)\b.*\b(service|work|job)\b", 0.86),
            (r"(?i)\bnot (done|cleaned|fixed) properly\b", 0.86),
        ],
    },
    IntentConfig {
        intent: Intent::RefundRequest,
        description: "Request money back for a paid booking",
        agent: "refund_agent",
        required_entities: &[EntityType::BookingId],
        patterns: &[
            (r"(?i)\brefund\b", 0.9),
            (r"(?i)\bmoney back\b", 0.9),
        ],
    },
    IntentConfig {
        intent: Intent::PolicyInquiry,
        description: "Question about policies, terms, or guarantees",
        agent: "policy_agent",
        required_entities: &[],
        patterns: &[
            (r"(?i)\b(policy|policies)\b", 0.92),
            (r"(?i)\bterms (and|&) conditions\b", 0.9),
        ],
    },
    IntentConfig {
        intent: Intent::PricingInquiry,
        description: "Question about prices or charges",
        agent: "pricing_agent",
        required_entities: &[],
        patterns: &[
            (r"(?i)\bhow much\b", 0.9),
            (r"(?i)\b(price|pricing|cost|costs|charges?|rates?)\b", 0.88),
        ],
    },
    IntentConfig {
        intent: Intent::AvailabilityCheck,
        description: "Check slot or area availability",
        agent: "availability_agent",
        required_entities: &[],
        patterns: &[
            (r"(?i)\b(available|availability)\b", 0.87),
            (r"(?i)\bdo you (serve|service|cover)\b", 0.87),
            (r"(?i)\b(slots?|timings?) (available|open|free)\b", 0.87),
        ],
    },
    IntentConfig {
        intent: Intent::PaymentIssue,
        description: "Problem with a payment or charge",
        agent: "payment_agent",
        required_entities: &[],
        patterns: &[
            (r"(?i)\bpayment (failed|issue|problem|stuck|pending)\b", 0.92),
            (r"(?i)\b(charged twice|double charged|overcharged)\b", 0.92),
        ],
    },
    IntentConfig {
        intent: Intent::ServiceInquiry,
        description: "Question about a specific service",
        agent: "service_agent",
        required_entities: &[],
        patterns: &[(r"(?i)\bwhat (is|does) .* (include|cover)\b", 0.86)],
    },
    IntentConfig {
        intent: Intent::ServiceDiscovery,
        description: "Browse which services exist",
        agent: "service_agent",
        required_entities: &[],
        patterns: &[
            (r"(?i)\bwhat services\b", 0.9),
            (r"(?i)\bservices (do you|you) (offer|provide|have)\b", 0.9),
            (r"(?i)\bshow me .* services\b", 0.88),
        ],
    },
    IntentConfig {
        intent: Intent::Greeting,
        description: "Small talk opener",
        agent: "coordinator",
        required_entities: &[],
        patterns: &[
            (r"(?i)^\s*(hi|hello|hey|namaste|good (morning|afternoon|evening))\s*[!.]*\s*$", 0.95),
        ],
    },
    IntentConfig {
        intent: Intent::OutOfScope,
        description: "Not something the marketplace handles",
        agent: "coordinator",
        required_entities: &[],
        patterns: &[],
    },
    IntentConfig {
        intent: Intent::UnclearIntent,
        description: "Could not determine what the user wants",
        agent: "coordinator",
        required_entities: &[],
        patterns: &[],
    },
];

pub static COMPILED_CONFIGS: LazyLock<Vec<CompiledIntentConfig>> = LazyLock::new(|| {
    CONFIGS
        .iter()
        .map(|config| CompiledIntentConfig {
            config,
            patterns: config
                .patterns
                .iter()
                .map(|(pattern, confidence)| (Regex::new(pattern).unwrap(), *confidence))
                .collect(),
        })
        .collect()
});

pub fn config_for(intent: Intent) -> &'static IntentConfig {
    CONFIGS
        .iter()
        .find(|config| config.intent == intent)
        .unwrap_or_else(|| &CONFIGS[CONFIGS.len() - 1])
}

pub fn agent_for_intent(intent: Intent) -> &'static str {
    config_for(intent).agent
}

pub fn description_for_intent(intent: Intent) -> &'static str {
    config_for(intent).description
}

pub fn required_entities(intent: Intent) -> &'static [EntityType] {
    config_for(intent).required_entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_intent_has_a_config_row() {
        for intent in Intent::ALL {
            assert_eq!(config_for(intent).intent, intent, "missing config for {intent}");
            assert!(!description_for_intent(intent).is_empty());
        }
    }

    #[test]
    fn transactional_intents_declare_required_slots() {
        assert!(!required_entities(Intent::BookingManagement).is_empty());
        assert_eq!(required_entities(Intent::CancellationRequest), &[EntityType::BookingId]);
        assert!(required_entities(Intent::Greeting).is_empty());
    }

    #[test]
    fn agent_mapping_is_total() {
        assert_eq!(agent_for_intent(Intent::PolicyInquiry), "policy_agent");
        assert_eq!(agent_for_intent(Intent::Greeting), "coordinator");
        assert_eq!(agent_for_intent(Intent::UnclearIntent), "coordinator");
    }

    #[test]
    fn all_patterns_compile() {
        // Touching the lazy forces compilation of every pattern.
        assert_eq!(COMPILED_CONFIGS.len(), CONFIGS.len());
    }
}
