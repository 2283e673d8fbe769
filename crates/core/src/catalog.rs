//! Service catalog model: categories → subcategories → rate cards.
//!
//! The catalog itself is owned by a collaborator service; the core receives a
//! snapshot of it and resolves service names, subcategory selections and
//! serviceable pincodes against that snapshot.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateCard {
    pub id: i64,
    pub name: String,
    pub base_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: i64,
    pub name: String,
    pub starting_price: f64,
    pub rate_card_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Alternate spellings and colloquial names the fuzzy resolver accepts.
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCatalog {
    pub categories: Vec<Category>,
    #[serde(default)]
    pub serviceable_pincodes: HashSet<String>,
}

impl ServiceCatalog {
    pub fn new(categories: Vec<Category>, serviceable_pincodes: HashSet<String>) -> Self {
        Self {
            categories,
            serviceable_pincodes,
        }
    }

    /// Exact (case-insensitive) lookup by canonical category name.
    pub fn category_by_name(&self, name: &str) -> Option<&Category> {
        let needle = name.trim().to_lowercase();
        self.categories
            .iter()
            .find(|cat| cat.name.to_lowercase() == needle)
    }

    pub fn category_by_id(&self, id: i64) -> Option<&Category> {
        self.categories.iter().find(|cat| cat.id == id)
    }

    pub fn is_serviceable(&self, pincode: &str) -> bool {
        // An empty set means pincode coverage is unknown; treat as serviceable
        // and let the booking collaborator reject if necessary.
        self.serviceable_pincodes.is_empty() || self.serviceable_pincodes.contains(pincode)
    }
}
