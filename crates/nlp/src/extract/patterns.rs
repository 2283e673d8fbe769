//! Pattern extractors for the remaining typed slots. The booking-id pattern
//! runs before anything that would accept a generic alphanumeric run.

use std::sync::LazyLock;

use regex::Regex;

use hearth_core::{Entity, EntityType, ExtractionMethod};

static BOOKING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bORD[A-Z0-9]{8}\b").unwrap());
static PINCODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{6}\b").unwrap());

static BOOK_VERB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(book|schedule|reserve)\b").unwrap());
static CANCEL_VERB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bcancel\b").unwrap());
static RESCHEDULE_VERB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(reschedule|postpone)\b").unwrap());

static QUALITY_ISSUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(not (done|cleaned|fixed) properly|poor|bad job|unsatisf\w*|incomplete|sloppy|mess)\b")
        .unwrap()
});
static DELAY_ISSUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(late|delays?|delayed|no.?show|never (came|arrived|showed))\b").unwrap()
});
static BEHAVIOR_ISSUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(rude|misbehav\w*|unprofessional|abusive)\b").unwrap());
static DAMAGE_ISSUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(damag\w*|broke|broken|scratch\w*|cracked)\b").unwrap());

static PAYMENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(upi|credit card|debit card|card|cash|net\s?banking|wallet)\b").unwrap()
});

pub fn extract_booking_id(text: &str) -> Option<Entity> {
    BOOKING_ID.find(text).map(|found| {
        Entity::new(
            EntityType::BookingId,
            found.as_str(),
            found.as_str().to_uppercase(),
            0.95,
            ExtractionMethod::Pattern,
        )
    })
}

pub fn extract_pincode(text: &str) -> Option<Entity> {
    PINCODE.find(text).map(|found| {
        Entity::new(
            EntityType::Location,
            found.as_str(),
            found.as_str().to_string(),
            0.85,
            ExtractionMethod::Pattern,
        )
    })
}

pub fn extract_action(text: &str) -> Option<Entity> {
    // Reschedule first: it implies both "book" and change-of-plan wording.
    let (raw, normalized) = if let Some(found) = RESCHEDULE_VERB.find(text) {
        (found.as_str(), "reschedule")
    } else if let Some(found) = CANCEL_VERB.find(text) {
        (found.as_str(), "cancel")
    } else if let Some(found) = BOOK_VERB.find(text) {
        (found.as_str(), "book")
    } else {
        return None;
    };
    Some(Entity::new(
        EntityType::Action,
        raw,
        normalized,
        0.9,
        ExtractionMethod::Pattern,
    ))
}

pub fn extract_issue_type(text: &str) -> Option<Entity> {
    let (raw, normalized) = if let Some(found) = DAMAGE_ISSUE.find(text) {
        (found.as_str(), "damage")
    } else if let Some(found) = BEHAVIOR_ISSUE.find(text) {
        (found.as_str(), "behavior")
    } else if let Some(found) = DELAY_ISSUE.find(text) {
        (found.as_str(), "delay")
    } else if let Some(found) = QUALITY_ISSUE.find(text) {
        (found.as_str(), "service_quality")
    } else {
        return None;
    };
    Some(Entity::new(
        EntityType::IssueType,
        raw,
        normalized,
        0.85,
        ExtractionMethod::Pattern,
    ))
}

pub fn extract_payment_type(text: &str) -> Option<Entity> {
    PAYMENT_TYPE.find(text).map(|found| {
        Entity::new(
            EntityType::PaymentType,
            found.as_str(),
            found.as_str().to_lowercase().replace(' ', ""),
            0.85,
            ExtractionMethod::Pattern,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_id_is_found_and_uppercased() {
        let entity = extract_booking_id("my order ord1a2b3c4d is late").unwrap();
        assert_eq!(entity.normalized_value, "ORD1A2B3C4D");
        assert!(extract_booking_id("order 12345678").is_none());
    }

    #[test]
    fn pincode_requires_exactly_six_digits() {
        assert_eq!(extract_pincode("I live at 400001").unwrap().normalized_value, "400001");
        assert!(extract_pincode("code 1234").is_none());
        // A ten-digit phone number is not a pincode.
        assert!(extract_pincode("9876543210").is_none());
    }

    #[test]
    fn action_verbs_normalize() {
        assert_eq!(extract_action("please book a slot").unwrap().normalized_value, "book");
        assert_eq!(extract_action("cancel it").unwrap().normalized_value, "cancel");
        assert_eq!(
            extract_action("can I reschedule my booking").unwrap().normalized_value,
            "reschedule"
        );
        assert!(extract_action("what are your prices").is_none());
    }

    #[test]
    fn issue_types_map_to_slugs() {
        assert_eq!(
            extract_issue_type("the cleaner was rude").unwrap().normalized_value,
            "behavior"
        );
        assert_eq!(
            extract_issue_type("they never came").unwrap().normalized_value,
            "delay"
        );
        assert_eq!(
            extract_issue_type("kitchen was not cleaned properly").unwrap().normalized_value,
            "service_quality"
        );
        assert_eq!(
            extract_issue_type("they damaged my sofa").unwrap().normalized_value,
            "damage"
        );
    }

    #[test]
    fn payment_types_normalize_compactly() {
        assert_eq!(extract_payment_type("paid via UPI").unwrap().normalized_value, "upi");
        assert_eq!(
            extract_payment_type("net banking transfer").unwrap().normalized_value,
            "netbanking"
        );
    }
}
