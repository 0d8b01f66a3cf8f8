//! Date mention resolution.
//!
//! The LLM extracts date mentions with a kind; this module resolves them
//! to ISO dates. Relative mentions ("next Monday", "tomorrow") resolve
//! against the document's created date when available, else ingestion
//! time. Unresolvable mentions keep their raw text without an ISO value.

use super::schema::{DateKind, DateRef, DraftDate};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

/// Resolve draft date mentions against a reference date.
///
/// `reference_label` names the reference source ("created_date" or
/// "ingested_at") and is recorded on relative resolutions.
pub fn resolve_dates(
    drafts: &[DraftDate],
    reference: DateTime<Utc>,
    reference_label: &str,
) -> Vec<DateRef> {
    drafts
        .iter()
        .map(|draft| resolve_one(draft, reference, reference_label))
        .collect()
}

fn resolve_one(draft: &DraftDate, reference: DateTime<Utc>, reference_label: &str) -> DateRef {
    let iso = match draft.kind {
        DateKind::Absolute => draft
            .iso
            .as_deref()
            .and_then(parse_iso)
            .or_else(|| parse_absolute(&draft.raw)),
        DateKind::Relative => parse_relative(&draft.raw, reference.date_naive()),
        DateKind::Implicit => None,
    };

    DateRef {
        raw: draft.raw.clone(),
        iso: iso.map(|date| date.format("%Y-%m-%d").to_string()),
        kind: draft.kind,
        context_reference: match draft.kind {
            DateKind::Relative if iso.is_some() => Some(reference_label.to_string()),
            _ => None,
        },
    }
}

fn parse_iso(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

/// Common absolute formats seen in documents.
fn parse_absolute(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    const FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%d.%m.%Y",
        "%d.%m.%y",
        "%m/%d/%Y",
        "%m/%d/%y",
        "%d %B %Y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%d %b %Y",
    ];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    None
}

fn weekday_of(word: &str) -> Option<Weekday> {
    match word {
        "monday" | "montag" => Some(Weekday::Mon),
        "tuesday" | "dienstag" => Some(Weekday::Tue),
        "wednesday" | "mittwoch" => Some(Weekday::Wed),
        "thursday" | "donnerstag" => Some(Weekday::Thu),
        "friday" | "freitag" => Some(Weekday::Fri),
        "saturday" | "samstag" => Some(Weekday::Sat),
        "sunday" | "sonntag" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Resolve relative phrases against a reference date.
fn parse_relative(raw: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let lower = raw.trim().to_lowercase();
    match lower.as_str() {
        "today" | "heute" => return Some(reference),
        "tomorrow" | "morgen" => return Some(reference + Duration::days(1)),
        "yesterday" | "gestern" => return Some(reference - Duration::days(1)),
        "next week" => return Some(reference + Duration::days(7)),
        "next month" => {
            let (year, month) = if reference.month() == 12 {
                (reference.year() + 1, 1)
            } else {
                (reference.year(), reference.month() + 1)
            };
            return NaiveDate::from_ymd_opt(year, month, 1);
        }
        _ => {}
    }

    // "next <weekday>" / "on <weekday>" / bare weekday.
    let word = lower
        .strip_prefix("next ")
        .or_else(|| lower.strip_prefix("on "))
        .unwrap_or(&lower);
    if let Some(target) = weekday_of(word) {
        let today = reference.weekday().num_days_from_monday() as i64;
        let wanted = target.num_days_from_monday() as i64;
        let mut ahead = (wanted - today).rem_euclid(7);
        if ahead == 0 {
            ahead = 7;
        }
        return Some(reference + Duration::days(ahead));
    }

    // "in N days" / "in N weeks"
    if let Some(rest) = lower.strip_prefix("in ") {
        let mut parts = rest.split_whitespace();
        if let (Some(amount), Some(unit)) = (parts.next(), parts.next()) {
            if let Ok(n) = amount.parse::<i64>() {
                let days = match unit {
                    "day" | "days" => Some(n),
                    "week" | "weeks" => Some(n * 7),
                    _ => None,
                };
                if let Some(days) = days {
                    return Some(reference + Duration::days(days));
                }
            }
        }
    }

    None
}
