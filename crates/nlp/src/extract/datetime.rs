//! Date and time recognizers.
//!
//! Dates normalize to ISO `YYYY-MM-DD`, times to 24-hour `HH:MM`. Relative
//! dates resolve against a caller-supplied `today` so turns are reproducible
//! in tests.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;

use hearth_core::{Entity, EntityType, ExtractionMethod};

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());
static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{4})\b").unwrap());
static IN_N_DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bin\s+(\d{1,2})\s+days?\b").unwrap());
static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:next\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .unwrap()
});

static CLOCK_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*(am|pm)?\b").unwrap());
static HOUR_MERIDIEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*(am|pm)\b").unwrap());

/// Extract the first date expression. Tried in specificity order: explicit
/// dates, relative words, "in N days", then weekday names.
pub fn extract_date(text: &str, today: NaiveDate) -> Option<Entity> {
    if let Some(caps) = ISO_DATE.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        return Some(date_entity(&caps[0], date));
    }

    if let Some(caps) = SLASH_DATE.captures(text) {
        // Day-first, matching how users in the service regions write dates.
        let date = NaiveDate::from_ymd_opt(
            caps[3].parse().ok()?,
            caps[2].parse().ok()?,
            caps[1].parse().ok()?,
        )?;
        return Some(date_entity(&caps[0], date));
    }

    let lowered = text.to_lowercase();
    // "day after tomorrow" must win over its "tomorrow" suffix.
    if lowered.contains("day after tomorrow") {
        return Some(date_entity("day after tomorrow", today + Duration::days(2)));
    }
    if lowered.contains("tomorrow") {
        return Some(date_entity("tomorrow", today + Duration::days(1)));
    }
    if lowered.contains("today") {
        return Some(date_entity("today", today));
    }

    if let Some(caps) = IN_N_DAYS.captures(text) {
        let days: i64 = caps[1].parse().ok()?;
        return Some(date_entity(&caps[0], today + Duration::days(days)));
    }

    if let Some(caps) = WEEKDAY.captures(text) {
        let target = parse_weekday(&caps[1])?;
        // "friday" and "next friday" both resolve to the coming Friday.
        let mut ahead =
            (target.num_days_from_monday() as i64) - (today.weekday().num_days_from_monday() as i64);
        if ahead <= 0 {
            ahead += 7;
        }
        return Some(date_entity(&caps[0], today + Duration::days(ahead)));
    }

    None
}

/// Extract the first time expression and normalize to `HH:MM`.
pub fn extract_time(text: &str) -> Option<Entity> {
    if let Some(caps) = CLOCK_TIME.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        let meridiem = caps.get(3).map(|m| m.as_str().to_lowercase());
        let hour = apply_meridiem(hour, meridiem.as_deref())?;
        if minute >= 60 {
            return None;
        }
        return Some(time_entity(&caps[0], hour, minute));
    }

    if let Some(caps) = HOUR_MERIDIEM.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let hour = apply_meridiem(hour, Some(&caps[2].to_lowercase()))?;
        return Some(time_entity(&caps[0], hour, 0));
    }

    let lowered = text.to_lowercase();
    if lowered.contains("noon") {
        return Some(time_entity("noon", 12, 0));
    }
    if lowered.contains("midnight") {
        return Some(time_entity("midnight", 0, 0));
    }

    None
}

/// Combined recognizer for phrases like "tomorrow 4pm" or "next friday
/// 2:30 pm". Only fires when both parts are present.
pub fn extract_datetime(text: &str, today: NaiveDate) -> Option<(Entity, Entity)> {
    let date = extract_date(text, today)?;
    let time = extract_time(text)?;
    Some((date, time))
}

fn apply_meridiem(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    let hour = match meridiem {
        Some("pm") if hour < 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    };
    (hour < 24).then_some(hour)
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn date_entity(raw: &str, date: NaiveDate) -> Entity {
    Entity::new(
        EntityType::Date,
        raw,
        date.format("%Y-%m-%d").to_string(),
        0.9,
        ExtractionMethod::Pattern,
    )
}

fn time_entity(raw: &str, hour: u32, minute: u32) -> Entity {
    Entity::new(
        EntityType::Time,
        raw,
        format!("{hour:02}:{minute:02}"),
        0.9,
        ExtractionMethod::Pattern,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-10-09 is a Thursday.
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 9).unwrap()
    }

    #[test]
    fn iso_and_slash_dates_normalize() {
        let entity = extract_date("come on 2025-12-01 please", today()).unwrap();
        assert_eq!(entity.normalized_value, "2025-12-01");

        let entity = extract_date("come on 01/12/2025 please", today()).unwrap();
        assert_eq!(entity.normalized_value, "2025-12-01");
    }

    #[test]
    fn relative_dates_resolve_against_today() {
        assert_eq!(
            extract_date("tomorrow", today()).unwrap().normalized_value,
            "2025-10-10"
        );
        assert_eq!(
            extract_date("day after tomorrow", today()).unwrap().normalized_value,
            "2025-10-11"
        );
        assert_eq!(
            extract_date("today works", today()).unwrap().normalized_value,
            "2025-10-09"
        );
        assert_eq!(
            extract_date("in 3 days", today()).unwrap().normalized_value,
            "2025-10-12"
        );
    }

    #[test]
    fn weekdays_resolve_to_the_coming_occurrence() {
        // Thursday → next Friday is the following day.
        assert_eq!(
            extract_date("next friday", today()).unwrap().normalized_value,
            "2025-10-10"
        );
        // Thursday → Thursday rolls a full week forward.
        assert_eq!(
            extract_date("thursday", today()).unwrap().normalized_value,
            "2025-10-16"
        );
    }

    #[test]
    fn times_normalize_to_24h() {
        assert_eq!(extract_time("4pm").unwrap().normalized_value, "16:00");
        assert_eq!(extract_time("at 2:30 pm").unwrap().normalized_value, "14:30");
        assert_eq!(extract_time("09:15").unwrap().normalized_value, "09:15");
        assert_eq!(extract_time("12 am").unwrap().normalized_value, "00:00");
        assert_eq!(extract_time("noon").unwrap().normalized_value, "12:00");
    }

    #[test]
    fn combined_datetime_requires_both_parts() {
        let (date, time) = extract_datetime("tomorrow 4pm", today()).unwrap();
        assert_eq!(date.normalized_value, "2025-10-10");
        assert_eq!(time.normalized_value, "16:00");

        let (date, time) = extract_datetime("next friday 2:30 pm", today()).unwrap();
        assert_eq!(date.normalized_value, "2025-10-10");
        assert_eq!(time.normalized_value, "14:30");

        assert!(extract_datetime("tomorrow", today()).is_none());
        assert!(extract_datetime("4pm", today()).is_none());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(extract_date("2025-13-40", today()).is_none());
        assert!(extract_time("25:00").is_none());
        assert!(extract_time("no time here").is_none());
    }
}
