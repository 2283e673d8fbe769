//! Clarifying-question templates, one per (slot, intent) pair.
//!
//! Tone is constant: one friendly sentence, plus a numbered option list for
//! subcategory picks. Repetition control (attempt counting, escalation)
//! belongs to the orchestrator, not here.

use std::fmt::Write as _;

use hearth_core::{EntityType, Intent, Subcategory};

#[derive(Debug, Clone, Default)]
pub struct QuestionContext {
    pub available_subcategories: Vec<Subcategory>,
    /// Canonical category name, when known ("Painting" → "Which type of
    /// painting…").
    pub category_name: Option<String>,
}

pub struct QuestionGenerator;

impl QuestionGenerator {
    pub fn generate(entity_type: EntityType, intent: Intent, ctx: &QuestionContext) -> String {
        match entity_type {
            EntityType::ServiceType => match intent {
                Intent::Complaint => {
                    "Which service was this about?".to_string()
                }
                _ => "Which service would you like to book?".to_string(),
            },
            EntityType::ServiceSubcategory => subcategory_question(ctx),
            EntityType::Date => match intent {
                Intent::BookingManagement => {
                    "What date would you like to schedule the service?".to_string()
                }
                _ => "Which date is this about?".to_string(),
            },
            EntityType::Time => "What time works best for you?".to_string(),
            EntityType::Location => {
                "Could you share your 6-digit pincode so I can check serviceability?".to_string()
            }
            EntityType::BookingId => match intent {
                Intent::RefundRequest => {
                    "Which booking should the refund be for? The ID looks like ORD1A2B3C4D."
                        .to_string()
                }
                _ => "Could you share your booking ID? It looks like ORD1A2B3C4D.".to_string(),
            },
            EntityType::IssueType => {
                "I'm sorry about that. What went wrong — the service quality, a delay, staff behaviour, or damage?"
                    .to_string()
            }
            EntityType::PaymentType => {
                "How did you pay — UPI, card, cash, or wallet?".to_string()
            }
            EntityType::Action => {
                "Would you like to book, cancel, or reschedule a service?".to_string()
            }
            EntityType::Query => "Could you tell me a bit more about what you need?".to_string(),
        }
    }
}

fn subcategory_question(ctx: &QuestionContext) -> String {
    let category = ctx.category_name.as_deref().unwrap_or("that service");
    let mut question = format!(
        "Sure! Which type of {} would you like?\n",
        category.to_lowercase()
    );
    for (index, option) in ctx.available_subcategories.iter().enumerate() {
        let _ = writeln!(
            question,
            "{}. {} (from ₹{})",
            index + 1,
            option.name,
            format_price(option.starting_price)
        );
    }
    question.push_str("You can reply with the number or the name.");
    question
}

fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{}", price as i64)
    } else {
        format!("{price:.2}")
    }
}
