//! Estimate absolute publication times from relative display text.
//!
//! Channel pages show "3 hours ago" or "2 недели назад" instead of a
//! timestamp. Date sorting needs an instant, so units are mapped to fixed
//! spans (month = 30 days, year = 365 days) and subtracted from `now`.

use chrono::{DateTime, Duration, NaiveDate, Utc};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Russian unit stems, checked in order. Each match scales the leading number.
const RU_UNITS: &[(&[&str], i64)] = &[
    (&["минут"], MINUTE),
    (&["час"], HOUR),
    (&["день", "дн", "суток"], DAY),
    (&["недел"], 7 * DAY),
    (&["месяц"], 30 * DAY),
    (&["год", "лет"], 365 * DAY),
];

/// English units; only honoured when the text also says "ago".
const EN_UNITS: &[(&str, i64)] = &[
    ("minute", MINUTE),
    ("hour", HOUR),
    ("day", DAY),
    ("week", 7 * DAY),
    ("month", 30 * DAY),
    ("year", 365 * DAY),
];

/// Best-effort instant for `text` relative to `now`. Unrecognized text maps
/// to the Unix epoch so it sorts last in newest-first order.
pub fn estimate_published_at(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return DateTime::UNIX_EPOCH;
    }

    if let Some(secs) = relative_seconds(&lower) {
        return now - Duration::seconds(secs);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text.trim()) {
        return dt.with_timezone(&Utc);
    }
    if let Some(dt) = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return dt.and_utc();
    }

    DateTime::UNIX_EPOCH
}

fn relative_seconds(lower: &str) -> Option<i64> {
    if lower.contains("секунд") || lower.contains("только что") {
        return Some(30);
    }
    if lower.contains("позавчера") {
        return Some(2 * DAY);
    }
    if lower.contains("вчера") {
        return Some(DAY);
    }
    for (stems, span) in RU_UNITS {
        if stems.iter().any(|s| lower.contains(s)) {
            return Some(leading_number(lower).saturating_mul(*span));
        }
    }

    if !lower.contains("ago") {
        return None;
    }
    if lower.contains("second") {
        return Some(30);
    }
    EN_UNITS
        .iter()
        .find(|(unit, _)| lower.contains(unit))
        .map(|(_, span)| leading_number(lower).saturating_mul(*span))
}

/// First run of ASCII digits, or 1 when none ("a day ago", "час назад").
fn leading_number(text: &str) -> i64 {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(1)
}
