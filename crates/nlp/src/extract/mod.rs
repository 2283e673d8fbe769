//! Hybrid entity extraction: combined date-time first, then per-type
//! patterns, then the fuzzy catalog resolver, with the LLM as last resort
//! (at most one call per extraction pass).

pub mod datetime;
pub mod fuzzy;
pub mod patterns;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use hearth_core::{Entity, EntityType, ExtractionMethod, ServiceCatalog, Subcategory};
use hearth_llm::{ChatMessage, ChatModel, GenerationParams, extract_json};

pub use fuzzy::{ResolvedService, resolve_service};

/// Carry-over context for an extraction pass: the options offered by the
/// last subcategory question and, for tests, a pinned "today".
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub available_subcategories: Vec<Subcategory>,
    pub today: Option<NaiveDate>,
}

impl ExtractionContext {
    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

pub struct EntityExtractor {
    catalog: Arc<ServiceCatalog>,
    model: Option<Arc<dyn ChatModel>>,
    params: GenerationParams,
}

impl EntityExtractor {
    pub fn new(
        catalog: Arc<ServiceCatalog>,
        model: Option<Arc<dyn ChatModel>>,
        params: GenerationParams,
    ) -> Self {
        Self {
            catalog,
            model,
            params,
        }
    }

    /// Extract every entity the caller expects from one message.
    ///
    /// Pattern tiers may fill any number of slots; the LLM is consulted once
    /// at most, only for the slots patterns missed.
    pub async fn extract_multiple(
        &self,
        message: &str,
        expected: &[EntityType],
        ctx: &ExtractionContext,
    ) -> Vec<Entity> {
        let expected: Vec<EntityType> = if expected.is_empty() {
            vec![
                EntityType::ServiceType,
                EntityType::Action,
                EntityType::Date,
                EntityType::Time,
                EntityType::Location,
                EntityType::BookingId,
            ]
        } else {
            expected.to_vec()
        };

        let mut found: Vec<Entity> = Vec::new();

        // Combined date-time runs first when both slots are open, so
        // "tomorrow 4pm" fills two slots from one phrase.
        if expected.contains(&EntityType::Date) && expected.contains(&EntityType::Time) {
            if let Some((date, time)) = datetime::extract_datetime(message, ctx.today()) {
                found.push(date);
                found.push(time);
            }
        }

        for entity_type in &expected {
            if found.iter().any(|entity| entity.entity_type == *entity_type) {
                continue;
            }
            if let Some(entity) = self.extract_single(message, *entity_type, ctx) {
                found.push(entity);
            }
        }

        let missing: Vec<EntityType> = expected
            .iter()
            .copied()
            .filter(|ty| !found.iter().any(|entity| entity.entity_type == *ty))
            .collect();
        if !missing.is_empty() && self.model.is_some() {
            found.extend(self.extract_with_llm(message, &missing, ctx).await);
        }

        debug!(
            expected = expected.len(),
            found = found.len(),
            "entity extraction pass complete"
        );
        found
    }

    /// Extract the answer to a specific slot question.
    pub fn extract_from_follow_up(
        &self,
        message: &str,
        expected: EntityType,
        ctx: &ExtractionContext,
    ) -> Option<Entity> {
        if expected == EntityType::Query {
            let trimmed = message.trim();
            if trimmed.is_empty() {
                return None;
            }
            return Some(Entity::new(
                EntityType::Query,
                trimmed,
                trimmed.to_string(),
                0.8,
                ExtractionMethod::Pattern,
            ));
        }
        self.extract_single(message, expected, ctx)
    }

    fn extract_single(
        &self,
        message: &str,
        entity_type: EntityType,
        ctx: &ExtractionContext,
    ) -> Option<Entity> {
        match entity_type {
            EntityType::Date => datetime::extract_date(message, ctx.today()),
            EntityType::Time => datetime::extract_time(message),
            EntityType::Location => patterns::extract_pincode(message),
            EntityType::BookingId => patterns::extract_booking_id(message),
            EntityType::Action => patterns::extract_action(message),
            EntityType::IssueType => patterns::extract_issue_type(message),
            EntityType::PaymentType => patterns::extract_payment_type(message),
            EntityType::ServiceType => self.extract_service(message),
            EntityType::ServiceSubcategory => {
                extract_subcategory_choice(message, &ctx.available_subcategories)
            }
            EntityType::Query => None,
        }
    }

    fn extract_service(&self, message: &str) -> Option<Entity> {
        let resolved = resolve_service(message, &self.catalog)?;
        let mut entity = Entity::new(
            EntityType::ServiceType,
            message.trim(),
            resolved.category_name.clone(),
            resolved.confidence,
            ExtractionMethod::Fuzzy,
        );
        if resolved.subcategory_id.is_some() {
            entity = entity.with_metadata(
                "resolved_service",
                serde_json::to_value(&resolved).unwrap_or_default(),
            );
        }
        Some(entity)
    }

    /// One LLM call for the slots the pattern tiers missed. The response is
    /// a flat JSON object keyed by entity-type label; values are re-run
    /// through the normalizers rather than trusted as-is.
    async fn extract_with_llm(
        &self,
        message: &str,
        missing: &[EntityType],
        ctx: &ExtractionContext,
    ) -> Vec<Entity> {
        let Some(model) = &self.model else {
            return Vec::new();
        };

        let labels = missing
            .iter()
            .map(|ty| ty.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!(
            "Extract the following fields from the customer message: {labels}.\n\
             Customer message: \"{message}\"\n\
             Respond with JSON only, using the field names as keys and null for\n\
             anything not present. Dates as YYYY-MM-DD, times as HH:MM (24h).\n\
             Example: {{\"date\": \"2025-01-05\", \"time\": null}}"
        );
        let messages = [ChatMessage::user(prompt)];

        let raw = match model.complete(&messages, &self.params).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, "llm entity extraction failed");
                return Vec::new();
            }
        };

        #[derive(Deserialize)]
        struct Flat(HashMap<String, Option<serde_json::Value>>);

        let Some(Flat(fields)) = extract_json::<Flat>(&raw) else {
            warn!("llm entity extraction response did not parse");
            return Vec::new();
        };

        let mut found = Vec::new();
        for entity_type in missing {
            let value = fields
                .get(entity_type.as_str())
                .and_then(|value| value.as_ref())
                .and_then(|value| value.as_str())
                .map(str::trim)
                .filter(|value| !value.is_empty());
            let Some(value) = value else { continue };

            // Prefer the deterministic normalizers over the model's own
            // formatting; fall back to the raw string when they pass.
            let entity = match self.extract_single(value, *entity_type, ctx) {
                Some(mut entity) => {
                    entity.raw_value = value.to_string();
                    entity.confidence = entity.confidence.min(0.7);
                    entity.method = ExtractionMethod::Llm;
                    entity
                }
                None => Entity::new(*entity_type, value, value.to_string(), 0.6, ExtractionMethod::Llm),
            };
            found.push(entity);
        }
        found
    }
}

/// Resolve a subcategory answer: a numbered pick ("3") or a name, matched
/// against the options the last question offered.
pub fn extract_subcategory_choice(message: &str, options: &[Subcategory]) -> Option<Entity> {
    if options.is_empty() {
        return None;
    }
    let trimmed = message.trim();

    if let Ok(index) = trimmed.parse::<usize>() {
        if (1..=options.len()).contains(&index) {
            return Some(subcategory_entity(trimmed, &options[index - 1]));
        }
        return None;
    }

    let lowered = trimmed.to_lowercase();
    options
        .iter()
        .find(|option| {
            let name = option.name.to_lowercase();
            lowered.contains(&name) || name.contains(&lowered)
        })
        .map(|option| subcategory_entity(trimmed, option))
}

fn subcategory_entity(raw: &str, option: &Subcategory) -> Entity {
    Entity::new(
        EntityType::ServiceSubcategory,
        raw,
        option.name.clone(),
        0.9,
        ExtractionMethod::Pattern,
    )
    .with_metadata("subcategory_id", serde_json::json!(option.id))
    .with_metadata("rate_card_id", serde_json::json!(option.rate_card_id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use hearth_core::Category;
    use hearth_llm::LlmError;

    fn catalog() -> Arc<ServiceCatalog> {
        Arc::new(ServiceCatalog::new(
            vec![
                Category {
                    id: 1,
                    name: "Painting".into(),
                    synonyms: vec!["paint job".into()],
                    subcategories: vec![
                        Subcategory {
                            id: 11,
                            name: "Interior Painting".into(),
                            starting_price: 4999.0,
                            rate_card_id: 110,
                        },
                        Subcategory {
                            id: 12,
                            name: "Exterior Painting".into(),
                            starting_price: 6999.0,
                            rate_card_id: 120,
                        },
                        Subcategory {
                            id: 13,
                            name: "Waterproofing".into(),
                            starting_price: 2999.0,
                            rate_card_id: 130,
                        },
                    ],
                },
                Category {
                    id: 2,
                    name: "Plumbing".into(),
                    synonyms: vec![],
                    subcategories: vec![Subcategory {
                        id: 21,
                        name: "Tap Repair".into(),
                        starting_price: 299.0,
                        rate_card_id: 210,
                    }],
                },
            ],
            HashSet::new(),
        ))
    }

    fn ctx() -> ExtractionContext {
        ExtractionContext {
            available_subcategories: vec![],
            today: Some(NaiveDate::from_ymd_opt(2025, 10, 9).unwrap()),
        }
    }

    fn extractor(model: Option<Arc<dyn ChatModel>>) -> EntityExtractor {
        EntityExtractor::new(
            catalog(),
            model,
            GenerationParams::for_extraction(&hearth_config::LlmConfig::default()),
        )
    }

    #[tokio::test]
    async fn booking_message_fills_multiple_slots_without_llm() {
        let extractor = extractor(None);
        let found = extractor
            .extract_multiple(
                "I want to book painting service tomorrow 4pm",
                &[
                    EntityType::ServiceType,
                    EntityType::Action,
                    EntityType::Date,
                    EntityType::Time,
                ],
                &ctx(),
            )
            .await;

        let by_type = |ty: EntityType| {
            found
                .iter()
                .find(|entity| entity.entity_type == ty)
                .map(|entity| entity.normalized_value.clone())
        };
        assert_eq!(by_type(EntityType::Action).as_deref(), Some("book"));
        assert_eq!(by_type(EntityType::ServiceType).as_deref(), Some("Painting"));
        assert_eq!(by_type(EntityType::Date).as_deref(), Some("2025-10-10"));
        assert_eq!(by_type(EntityType::Time).as_deref(), Some("16:00"));
    }

    #[tokio::test]
    async fn subcategory_mention_attaches_resolved_service() {
        let extractor = extractor(None);
        let found = extractor
            .extract_multiple("book waterproofing", &[EntityType::ServiceType], &ctx())
            .await;
        let entity = &found[0];
        assert_eq!(entity.normalized_value, "Painting");
        let resolved = &entity.metadata["resolved_service"];
        assert_eq!(resolved["subcategory_id"], 13);
        assert_eq!(resolved["rate_card_id"], 130);
    }

    #[test]
    fn numeric_follow_up_selects_subcategory() {
        let options = catalog().categories[0].subcategories.clone();
        let entity = extract_subcategory_choice("1", &options).unwrap();
        assert_eq!(entity.normalized_value, "Interior Painting");
        assert_eq!(entity.metadata["rate_card_id"], 110);

        assert!(extract_subcategory_choice("7", &options).is_none());
    }

    #[test]
    fn named_follow_up_selects_subcategory() {
        let options = catalog().categories[0].subcategories.clone();
        let entity = extract_subcategory_choice("interior painting", &options).unwrap();
        assert_eq!(entity.normalized_value, "Interior Painting");
        assert_eq!(entity.metadata["subcategory_id"], 11);
    }

    #[test]
    fn follow_up_extraction_uses_expected_type() {
        let extractor = extractor(None);
        let entity = extractor
            .extract_from_follow_up("2:30 pm", EntityType::Time, &ctx())
            .unwrap();
        assert_eq!(entity.normalized_value, "14:30");

        let entity = extractor
            .extract_from_follow_up("400001", EntityType::Location, &ctx())
            .unwrap();
        assert_eq!(entity.normalized_value, "400001");
    }

    struct Scripted(&'static str);

    #[async_trait::async_trait]
    impl ChatModel for Scripted {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn llm_fills_slots_patterns_missed() {
        let extractor = extractor(Some(Arc::new(Scripted(
            r#"{"issue_type": "delay", "booking_id": null}"#,
        ))));
        let found = extractor
            .extract_multiple(
                "your folks kept me waiting forever",
                &[EntityType::IssueType, EntityType::BookingId],
                &ctx(),
            )
            .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_type, EntityType::IssueType);
        assert_eq!(found[0].method, ExtractionMethod::Llm);
    }
}
