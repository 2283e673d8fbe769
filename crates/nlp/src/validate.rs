//! Domain validation of normalized entity values.
//!
//! The service-type rule drives the subcategory sub-dialog: a category with
//! several subcategories is *not yet valid*; the outcome carries the option
//! list so the orchestrator can ask, while a single-subcategory category
//! auto-selects its rate card.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime, Utc};
use regex::Regex;
use tracing::debug;

use hearth_core::{BookingService, CollabError, EntityType, Intent, ServiceCatalog, Subcategory};

use crate::extract::{extract_subcategory_choice, resolve_service};

static BOOKING_ID_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ORD[A-Z0-9]{8}$").unwrap());
static PINCODE_FORMAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6}$").unwrap());

#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub normalized_value: Option<String>,
    pub error_message: Option<String>,
    pub suggestions: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ValidationOutcome {
    fn valid(normalized: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            normalized_value: Some(normalized.into()),
            ..Self::default()
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn requires_subcategory_selection(&self) -> bool {
        self.metadata
            .get("requires_subcategory_selection")
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub intent: Option<Intent>,
    pub available_subcategories: Vec<Subcategory>,
    pub today: Option<NaiveDate>,
}

impl ValidationContext {
    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

pub struct EntityValidator {
    catalog: Arc<ServiceCatalog>,
    business_open_hour: u32,
    business_close_hour: u32,
    booking_service: Option<Arc<dyn BookingService>>,
}

impl EntityValidator {
    pub fn new(
        catalog: Arc<ServiceCatalog>,
        business_open_hour: u32,
        business_close_hour: u32,
        booking_service: Option<Arc<dyn BookingService>>,
    ) -> Self {
        Self {
            catalog,
            business_open_hour,
            business_close_hour,
            booking_service,
        }
    }

    pub async fn validate(
        &self,
        entity_type: EntityType,
        value: &str,
        ctx: &ValidationContext,
    ) -> ValidationOutcome {
        let outcome = match entity_type {
            EntityType::Date => self.validate_date(value, ctx),
            EntityType::Time => self.validate_time(value),
            EntityType::Location => self.validate_location(value),
            EntityType::ServiceType => self.validate_service_type(value),
            EntityType::ServiceSubcategory => self.validate_subcategory(value, ctx),
            EntityType::BookingId => self.validate_booking_id(value).await,
            EntityType::Action => self.validate_action(value),
            EntityType::IssueType | EntityType::PaymentType | EntityType::Query => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    ValidationOutcome::invalid("I didn't catch that — could you rephrase?")
                } else {
                    ValidationOutcome::valid(trimmed.to_lowercase())
                }
            }
        };
        debug!(
            entity_type = entity_type.as_str(),
            is_valid = outcome.is_valid,
            "entity validated"
        );
        outcome
    }

    fn validate_date(&self, value: &str, ctx: &ValidationContext) -> ValidationOutcome {
        let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") else {
            return ValidationOutcome::invalid(
                "I couldn't read that date. Could you give it as YYYY-MM-DD, or say something like \"tomorrow\"?",
            )
            .with_suggestions(vec!["tomorrow".into(), "2025-12-01".into()]);
        };
        let booking_like = ctx.intent.map(|intent| intent.is_transactional()).unwrap_or(false);
        if booking_like && date < ctx.today() {
            return ValidationOutcome::invalid(
                "That date has already passed. When would you like the service?",
            );
        }
        ValidationOutcome::valid(date.format("%Y-%m-%d").to_string())
    }

    fn validate_time(&self, value: &str) -> ValidationOutcome {
        let Ok(time) = NaiveTime::parse_from_str(value, "%H:%M") else {
            return ValidationOutcome::invalid(
                "I couldn't read that time. Could you give it like \"14:00\" or \"2 pm\"?",
            );
        };
        let hour = chrono::Timelike::hour(&time);
        if hour < self.business_open_hour || hour >= self.business_close_hour {
            return ValidationOutcome::invalid(format!(
                "Our service hours are {:02}:00 to {:02}:00. Could you pick a time in that window?",
                self.business_open_hour, self.business_close_hour
            ));
        }
        ValidationOutcome::valid(time.format("%H:%M").to_string())
    }

    fn validate_location(&self, value: &str) -> ValidationOutcome {
        let trimmed = value.trim();
        if !PINCODE_FORMAT.is_match(trimmed) {
            return ValidationOutcome::invalid(
                "Could you share a 6-digit pincode so I can check serviceability?",
            );
        }
        if !self.catalog.is_serviceable(trimmed) {
            return ValidationOutcome::invalid(format!(
                "Sorry, we don't serve pincode {trimmed} yet."
            ));
        }
        ValidationOutcome::valid(trimmed.to_string())
    }

    fn validate_service_type(&self, value: &str) -> ValidationOutcome {
        let resolved = match self.catalog.category_by_name(value) {
            Some(category) => crate::extract::ResolvedService {
                category_id: category.id,
                category_name: category.name.clone(),
                subcategory_id: None,
                subcategory_name: None,
                rate_card_id: None,
                confidence: 1.0,
            },
            None => match resolve_service(value, &self.catalog) {
                Some(resolved) => resolved,
                None => {
                    let suggestions: Vec<String> = self
                        .catalog
                        .categories
                        .iter()
                        .take(3)
                        .map(|category| category.name.clone())
                        .collect();
                    return ValidationOutcome::invalid(format!(
                        "I don't recognize \"{value}\" as one of our services."
                    ))
                    .with_suggestions(suggestions);
                }
            },
        };

        let category = match self.catalog.category_by_id(resolved.category_id) {
            Some(category) => category,
            None => return ValidationOutcome::invalid("That service is not available right now."),
        };

        // A direct subcategory mention already carries the rate card.
        if let (Some(subcategory_id), Some(rate_card_id)) =
            (resolved.subcategory_id, resolved.rate_card_id)
        {
            return ValidationOutcome::valid(category.name.clone())
                .with_metadata("category_id", serde_json::json!(category.id))
                .with_metadata("subcategory_id", serde_json::json!(subcategory_id))
                .with_metadata("rate_card_id", serde_json::json!(rate_card_id));
        }

        match category.subcategories.as_slice() {
            [] => ValidationOutcome::invalid(format!(
                "{} is not bookable online at the moment.",
                category.name
            )),
            [only] => ValidationOutcome::valid(category.name.clone())
                .with_metadata("category_id", serde_json::json!(category.id))
                .with_metadata("subcategory_id", serde_json::json!(only.id))
                .with_metadata("rate_card_id", serde_json::json!(only.rate_card_id)),
            many => {
                let mut outcome = ValidationOutcome::invalid(format!(
                    "{} has a few options — which one do you need?",
                    category.name
                ));
                outcome.normalized_value = Some(category.name.clone());
                outcome
                    .with_metadata("requires_subcategory_selection", serde_json::json!(true))
                    .with_metadata("category_id", serde_json::json!(category.id))
                    .with_metadata(
                        "available_subcategories",
                        serde_json::to_value(many).unwrap_or_default(),
                    )
            }
        }
    }

    fn validate_subcategory(&self, value: &str, ctx: &ValidationContext) -> ValidationOutcome {
        if ctx.available_subcategories.is_empty() {
            return ValidationOutcome::invalid("Let me first check which service you need.");
        }
        match extract_subcategory_choice(value, &ctx.available_subcategories) {
            Some(entity) => {
                let mut outcome = ValidationOutcome::valid(entity.normalized_value.clone());
                for (key, metadata_value) in entity.metadata {
                    outcome.metadata.insert(key, metadata_value);
                }
                outcome
            }
            None => {
                let suggestions: Vec<String> = ctx
                    .available_subcategories
                    .iter()
                    .map(|option| option.name.clone())
                    .collect();
                ValidationOutcome::invalid(
                    "I didn't catch which option you meant — you can reply with the number or the name.",
                )
                .with_suggestions(suggestions)
            }
        }
    }

    async fn validate_booking_id(&self, value: &str) -> ValidationOutcome {
        let normalized = value.trim().to_uppercase();
        if !BOOKING_ID_FORMAT.is_match(&normalized) {
            return ValidationOutcome::invalid(
                "That doesn't look like a booking ID — it starts with ORD followed by 8 characters.",
            );
        }

        let Some(bookings) = &self.booking_service else {
            return ValidationOutcome::valid(normalized);
        };
        match bookings.booking_exists(&normalized).await {
            Ok(true) => ValidationOutcome::valid(normalized),
            Ok(false) => ValidationOutcome::invalid(format!(
                "I couldn't find a booking {normalized}. Could you double-check the ID?"
            )),
            // Collaborator down: accept the well-formed id, the handler will
            // retry the lookup when it executes.
            Err(CollabError::Unavailable(_)) => ValidationOutcome::valid(normalized)
                .with_metadata("existence_unverified", serde_json::json!(true)),
            Err(error) => ValidationOutcome::invalid(format!("I couldn't verify that booking: {error}")),
        }
    }

    fn validate_action(&self, value: &str) -> ValidationOutcome {
        let normalized = value.trim().to_lowercase();
        if ["book", "cancel", "reschedule"].contains(&normalized.as_str()) {
            ValidationOutcome::valid(normalized)
        } else {
            ValidationOutcome::invalid("I can help you book, cancel, or reschedule a service.")
        }
    }
}
