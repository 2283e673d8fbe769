//! PII detection and masking.
//!
//! Masking is idempotent: every mask keeps at most a short suffix of the
//! original value and replaces the rest with characters no detector matches,
//! so `mask(mask(t)) == mask(t)` and a masked text re-scans clean.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use hearth_config::PiiConfig;

use crate::patterns::{
    AADHAAR_PATTERN, CREDIT_CARD_PATTERNS, EMAIL_PATTERN, PAN_PATTERN, PHONE_PATTERNS,
    SSN_PATTERNS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Aadhaar,
    Pan,
}

impl PiiType {
    pub const ALL: [PiiType; 6] = [
        PiiType::Email,
        PiiType::Phone,
        PiiType::Ssn,
        PiiType::CreditCard,
        PiiType::Aadhaar,
        PiiType::Pan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PiiType::Email => "email",
            PiiType::Phone => "phone",
            PiiType::Ssn => "ssn",
            PiiType::CreditCard => "credit_card",
            PiiType::Aadhaar => "aadhaar",
            PiiType::Pan => "pan",
        }
    }

    fn enabled(&self, config: &PiiConfig) -> bool {
        match self {
            PiiType::Email => config.detect_email,
            PiiType::Phone => config.detect_phone,
            PiiType::Ssn => config.detect_ssn,
            PiiType::CreditCard => config.detect_credit_card,
            PiiType::Aadhaar => config.detect_aadhaar,
            PiiType::Pan => config.detect_pan,
        }
    }

    fn patterns(&self) -> Vec<&'static Regex> {
        match self {
            PiiType::Email => vec![&EMAIL_PATTERN],
            PiiType::Phone => PHONE_PATTERNS.iter().collect(),
            PiiType::Ssn => SSN_PATTERNS.iter().collect(),
            PiiType::CreditCard => CREDIT_CARD_PATTERNS.iter().collect(),
            PiiType::Aadhaar => vec![&AADHAAR_PATTERN],
            PiiType::Pan => vec![&PAN_PATTERN],
        }
    }

    fn mask(&self, value: &str) -> String {
        match self {
            PiiType::Email => mask_email(value),
            PiiType::Phone => mask_phone(value),
            PiiType::Ssn => mask_ssn(value),
            PiiType::CreditCard => mask_credit_card(value),
            PiiType::Aadhaar => mask_aadhaar(value),
            PiiType::Pan => mask_pan(value),
        }
    }
}

/// Detect every enabled PII family in `text`.
pub fn detect_all_pii(text: &str, config: &PiiConfig) -> HashMap<PiiType, Vec<String>> {
    let mut results = HashMap::new();
    for pii_type in PiiType::ALL {
        if !pii_type.enabled(config) {
            continue;
        }
        let mut found: Vec<String> = Vec::new();
        for pattern in pii_type.patterns() {
            found.extend(pattern.find_iter(text).map(|m| m.as_str().to_string()));
        }
        if !found.is_empty() {
            results.insert(pii_type, found);
        }
    }
    results
}

pub fn has_pii(text: &str, config: &PiiConfig) -> bool {
    !detect_all_pii(text, config).is_empty()
}

/// Mask every enabled PII family in `text`.
///
/// Returns the masked text plus per-family counts. Families are applied in a
/// fixed order (card before the generic digit families) so specific patterns
/// win over generic ones.
pub fn mask_pii_in_text(text: &str, config: &PiiConfig) -> (String, HashMap<PiiType, usize>) {
    let mut masked = text.to_string();
    let mut counts = HashMap::new();

    const ORDER: [PiiType; 6] = [
        PiiType::Email,
        PiiType::CreditCard,
        PiiType::Aadhaar,
        PiiType::Phone,
        PiiType::Ssn,
        PiiType::Pan,
    ];

    for pii_type in ORDER {
        if !pii_type.enabled(config) {
            continue;
        }
        let mut count = 0;
        for pattern in pii_type.patterns() {
            count += pattern.find_iter(&masked).count();
            masked = pattern
                .replace_all(&masked, |caps: &regex::Captures<'_>| {
                    pii_type.mask(caps.get(0).map(|m| m.as_str()).unwrap_or_default())
                })
                .into_owned();
        }
        if count > 0 {
            counts.insert(pii_type, count);
        }
    }

    (masked, counts)
}

/// Shared evaluation for the input detector and the output leakage detector:
/// sanitize (mask) when masking is enabled, block otherwise.
pub(crate) fn evaluate_pii_guard(
    name: &'static str,
    text: &str,
    config: &PiiConfig,
) -> crate::result::GuardrailResult {
    use crate::result::{GuardrailResult, Severity};

    let detected = detect_all_pii(text, config);
    if detected.is_empty() {
        return GuardrailResult::allow(name, "no PII detected");
    }

    let high_risk = detected.keys().any(|pii_type| {
        matches!(
            pii_type,
            PiiType::Ssn | PiiType::CreditCard | PiiType::Aadhaar | PiiType::Pan
        )
    });
    let severity = if high_risk { Severity::High } else { Severity::Medium };
    let details = serde_json::json!({
        "detected_types": detected
            .keys()
            .map(|pii_type| pii_type.as_str())
            .collect::<Vec<_>>(),
    });

    if config.mask_pii {
        let (masked, counts) = mask_pii_in_text(text, config);
        let masked_count: usize = counts.values().sum();
        GuardrailResult::sanitize(
            name,
            severity,
            format!("masked {masked_count} PII value(s)"),
            masked,
            details,
        )
    } else {
        GuardrailResult::block(
            name,
            severity,
            "Please avoid sharing personal information in chat.",
            details,
        )
    }
}

// ── Per-family maskers ────────────────────────────────────────────────────────

/// `john@example.com` → `j***@example.com`.
///
/// The masked local part must end in `*`, never a word character: a trailing
/// letter directly before `@` would re-match the email pattern and break
/// idempotence.
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return "[EMAIL]".to_string();
    };
    let masked_local = if local.len() <= 2 {
        "*".repeat(local.len())
    } else {
        let first = &local[..1];
        format!("{first}{}", "*".repeat(local.len() - 1))
    };
    format!("{masked_local}@{domain}")
}

/// Keeps the last four digits: `123-456-7890` → `***-***-7890`.
pub fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "[PHONE]".to_string();
    }
    format!("***-***-{}", &digits[digits.len() - 4..])
}

pub fn mask_ssn(ssn: &str) -> String {
    let digits: String = ssn.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 9 {
        return "[SSN]".to_string();
    }
    format!("***-**-{}", &digits[5..])
}

pub fn mask_credit_card(card: &str) -> String {
    let digits: String = card.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "[CARD]".to_string();
    }
    format!("****-****-****-{}", &digits[digits.len() - 4..])
}

pub fn mask_aadhaar(aadhaar: &str) -> String {
    let digits: String = aadhaar.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 12 {
        return "[AADHAAR]".to_string();
    }
    format!("****-****-{}", &digits[8..])
}

/// Keeps only the trailing check letter.
pub fn mask_pan(pan: &str) -> String {
    if pan.len() < 2 {
        return "[PAN]".to_string();
    }
    let last = &pan[pan.len() - 1..];
    format!("{}{last}", "*".repeat(pan.len() - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PiiConfig {
        PiiConfig::default()
    }

    #[test]
    fn masks_keep_recognizable_suffixes() {
        assert_eq!(mask_email("john@example.com"), "j***@example.com");
        assert_eq!(mask_phone("123-456-7890"), "***-***-7890");
        assert_eq!(mask_ssn("123-45-6789"), "***-**-6789");
        assert_eq!(mask_credit_card("4111 1111 1111 1234"), "****-****-****-1234");
        assert_eq!(mask_aadhaar("1234 5678 9012"), "****-****-9012");
        assert_eq!(mask_pan("ABCDE1234F"), "*********F");
    }

    #[test]
    fn detect_finds_mixed_families() {
        let text = "Mail john@example.com or call 123-456-7890";
        let detected = detect_all_pii(text, &config());
        assert!(detected.contains_key(&PiiType::Email));
        assert!(detected.contains_key(&PiiType::Phone));
        assert!(!detected.contains_key(&PiiType::Pan));
    }

    #[test]
    fn mask_removes_literals_and_counts() {
        let text = "My email is john@example.com and phone is 123-456-7890";
        let (masked, counts) = mask_pii_in_text(text, &config());
        assert!(!masked.contains("john@example.com"));
        assert!(!masked.contains("123-456-7890"));
        assert!(masked.contains("j***@example.com"));
        assert!(masked.contains("***-***-7890"));
        assert_eq!(counts[&PiiType::Email], 1);
        assert_eq!(counts[&PiiType::Phone], 1);
    }

    #[test]
    fn masking_is_idempotent() {
        let text = "card 4111-1111-1111-1234, aadhaar 1234 5678 9012, pan ABCDE1234F";
        let (once, _) = mask_pii_in_text(text, &config());
        let (twice, counts) = mask_pii_in_text(&once, &config());
        assert_eq!(once, twice);
        assert!(counts.is_empty(), "second pass found PII: {counts:?}");
    }

    #[test]
    fn masked_text_scans_clean() {
        let text = "reach me at jane.doe@corp.io / (987) 654-3210 / 987-65-4321";
        let (masked, _) = mask_pii_in_text(text, &config());
        assert!(detect_all_pii(&masked, &config()).is_empty());
    }

    #[test]
    fn disabled_families_are_skipped() {
        let mut config = config();
        config.detect_email = false;
        let text = "mail john@example.com";
        let (masked, counts) = mask_pii_in_text(text, &config);
        assert!(masked.contains("john@example.com"));
        assert!(counts.is_empty());
    }
}
