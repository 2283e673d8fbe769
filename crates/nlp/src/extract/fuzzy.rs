//! Fuzzy service-name resolution against the catalog.
//!
//! Handles misspellings and colloquial names ("pakkers" → Packers and
//! Movers, "house cleaning" → Home Cleaning). A direct subcategory hit also
//! carries the resolved rate card so the orchestrator can skip the
//! subcategory question entirely.

use serde::{Deserialize, Serialize};

use hearth_core::{Category, ServiceCatalog};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedService {
    pub category_id: i64,
    pub category_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_card_id: Option<i64>,
    pub confidence: f32,
}

/// Resolve a service mention. Tried in order: subcategory name, category
/// name, synonyms, then per-word edit distance.
pub fn resolve_service(text: &str, catalog: &ServiceCatalog) -> Option<ResolvedService> {
    let lowered = text.to_lowercase();

    // Subcategory names are the most specific mention a user can make.
    for category in &catalog.categories {
        for subcategory in &category.subcategories {
            if lowered.contains(&subcategory.name.to_lowercase()) {
                return Some(ResolvedService {
                    category_id: category.id,
                    category_name: category.name.clone(),
                    subcategory_id: Some(subcategory.id),
                    subcategory_name: Some(subcategory.name.clone()),
                    rate_card_id: Some(subcategory.rate_card_id),
                    confidence: 0.95,
                });
            }
        }
    }

    for category in &catalog.categories {
        if lowered.contains(&category.name.to_lowercase()) {
            return Some(category_only(category, 0.9));
        }
    }

    for category in &catalog.categories {
        for synonym in &category.synonyms {
            if lowered.contains(&synonym.to_lowercase()) {
                return Some(category_only(category, 0.85));
            }
        }
    }

    fuzzy_word_match(&lowered, catalog)
}

fn category_only(category: &Category, confidence: f32) -> ResolvedService {
    ResolvedService {
        category_id: category.id,
        category_name: category.name.clone(),
        subcategory_id: None,
        subcategory_name: None,
        rate_card_id: None,
        confidence,
    }
}

/// Compare every message word against the significant words of every
/// category name and synonym, tolerating one edit per four characters.
fn fuzzy_word_match(lowered: &str, catalog: &ServiceCatalog) -> Option<ResolvedService> {
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() >= 4)
        .collect();

    let mut best: Option<(usize, &Category)> = None;
    for category in &catalog.categories {
        let mut terms: Vec<String> = vec![category.name.to_lowercase()];
        terms.extend(category.synonyms.iter().map(|s| s.to_lowercase()));

        for term in &terms {
            for term_word in term.split_whitespace().filter(|w| w.len() >= 4) {
                let budget = (term_word.len() / 5).max(1);
                for word in &words {
                    // Requiring the first letter to agree prunes the worst
                    // false positives ("meaning" vs "cleaning").
                    if word.chars().next() != term_word.chars().next() {
                        continue;
                    }
                    let distance = levenshtein(word, term_word);
                    if distance <= budget && best.map(|(d, _)| distance < d).unwrap_or(true) {
                        best = Some((distance, category));
                    }
                }
            }
        }
    }

    best.map(|(_, category)| category_only(category, 0.75))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use hearth_core::{Category, Subcategory};

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::new(
            vec![
                Category {
                    id: 1,
                    name: "Home Cleaning".into(),
                    synonyms: vec!["house cleaning".into(), "deep cleaning".into()],
                    subcategories: vec![
                        Subcategory {
                            id: 11,
                            name: "Kitchen Cleaning".into(),
                            starting_price: 999.0,
                            rate_card_id: 110,
                        },
                        Subcategory {
                            id: 12,
                            name: "Bathroom Cleaning".into(),
                            starting_price: 899.0,
                            rate_card_id: 120,
                        },
                    ],
                },
                Category {
                    id: 2,
                    name: "Packers and Movers".into(),
                    synonyms: vec!["relocation".into(), "shifting".into()],
                    subcategories: vec![Subcategory {
                        id: 21,
                        name: "Local Shifting".into(),
                        starting_price: 3999.0,
                        rate_card_id: 210,
                    }],
                },
            ],
            HashSet::new(),
        )
    }

    #[test]
    fn exact_category_name_resolves() {
        let resolved = resolve_service("I need home cleaning next week", &catalog()).unwrap();
        assert_eq!(resolved.category_name, "Home Cleaning");
        assert!(resolved.subcategory_id.is_none());
    }

    #[test]
    fn synonym_resolves_to_canonical_category() {
        let resolved = resolve_service("book house cleaning please", &catalog()).unwrap();
        assert_eq!(resolved.category_name, "Home Cleaning");
    }

    #[test]
    fn subcategory_mention_carries_rate_card() {
        let resolved = resolve_service("kitchen cleaning tomorrow", &catalog()).unwrap();
        assert_eq!(resolved.subcategory_id, Some(11));
        assert_eq!(resolved.rate_card_id, Some(110));
        assert_eq!(resolved.category_id, 1);
    }

    #[test]
    fn misspelling_resolves_through_edit_distance() {
        let resolved = resolve_service("need pakkers for my move", &catalog()).unwrap();
        assert_eq!(resolved.category_name, "Packers and Movers");
        assert!(resolved.confidence < 0.85);
    }

    #[test]
    fn unrelated_text_does_not_resolve() {
        assert!(resolve_service("what is the meaning of life", &catalog()).is_none());
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("packers", "pakkers"), 1);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
    }
}
