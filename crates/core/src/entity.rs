use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Typed slots the extractor knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    ServiceType,
    ServiceSubcategory,
    Date,
    Time,
    Location,
    Action,
    BookingId,
    IssueType,
    PaymentType,
    Query,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::ServiceType => "service_type",
            EntityType::ServiceSubcategory => "service_subcategory",
            EntityType::Date => "date",
            EntityType::Time => "time",
            EntityType::Location => "location",
            EntityType::Action => "action",
            EntityType::BookingId => "booking_id",
            EntityType::IssueType => "issue_type",
            EntityType::PaymentType => "payment_type",
            EntityType::Query => "query",
        }
    }

    pub fn parse(label: &str) -> Option<EntityType> {
        const ALL: [EntityType; 10] = [
            EntityType::ServiceType,
            EntityType::ServiceSubcategory,
            EntityType::Date,
            EntityType::Time,
            EntityType::Location,
            EntityType::Action,
            EntityType::BookingId,
            EntityType::IssueType,
            EntityType::PaymentType,
            EntityType::Query,
        ];
        ALL.iter().copied().find(|ty| ty.as_str() == label.trim())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which extraction tier produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Pattern,
    Fuzzy,
    Llm,
}

/// A single extracted entity. `normalized_value` is always populated before
/// the entity is stored anywhere (ISO dates, HH:MM times, canonical catalog
/// names).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub raw_value: String,
    pub normalized_value: String,
    pub confidence: f32,
    pub method: ExtractionMethod,
    /// Auxiliary identifiers the extractor resolved along the way, e.g. a
    /// `resolved_service` object carrying catalog ids.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Entity {
    pub fn new(
        entity_type: EntityType,
        raw_value: impl Into<String>,
        normalized_value: impl Into<String>,
        confidence: f32,
        method: ExtractionMethod,
    ) -> Self {
        Self {
            entity_type,
            raw_value: raw_value.into(),
            normalized_value: normalized_value.into(),
            confidence,
            method,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_labels_roundtrip() {
        assert_eq!(EntityType::parse("service_type"), Some(EntityType::ServiceType));
        assert_eq!(EntityType::parse("booking_id"), Some(EntityType::BookingId));
        assert_eq!(EntityType::parse("bogus"), None);
    }

    #[test]
    fn metadata_builder_attaches_values() {
        let entity = Entity::new(
            EntityType::ServiceType,
            "pakkers",
            "Packers and Movers",
            0.8,
            ExtractionMethod::Fuzzy,
        )
        .with_metadata("resolved_service", serde_json::json!({"category_id": 7}));
        assert_eq!(entity.metadata["resolved_service"]["category_id"], 7);
    }
}
