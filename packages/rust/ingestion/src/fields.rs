//! Field-mapping helpers: candidate-key lookup, date and amount parsing.
//!
//! Everything here is lenient. A value that cannot be interpreted becomes
//! `None`; it never fails the surrounding record.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::debug;

use crate::connectors::RawRecord;

/// Date-only layouts tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

/// Date-time layouts tried in order (time part discarded).
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%b %d, %Y %I:%M:%S %p",
];

/// Loose truthiness: null, `false`, zero, and empty strings/collections are absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// First present value among `keys`, checked in order.
pub fn first_present<'a>(obj: &'a RawRecord, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| is_present(value))
}

/// First present value among `keys`, rendered as a string.
///
/// Numbers are accepted (identifiers are often numeric); objects and arrays are not.
pub fn first_string(obj: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .filter(|value| is_present(value))
        .find_map(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Concatenate string fields longer than `min_chars` with blank-line separators.
///
/// Shorter fields are treated as labels rather than prose and dropped.
pub fn descriptive_text(obj: &RawRecord, keys: &[&str], min_chars: usize) -> Option<String> {
    let parts: Vec<&str> = keys
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .filter(|text| text.chars().count() > min_chars)
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Parse an award amount from a JSON number or a numeric string (`$1,250,000`).
pub fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | ' '))
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };

    match amount {
        Some(a) if a.is_finite() && a != 0.0 => Some(a),
        Some(_) => None,
        None => {
            debug!(%value, "could not parse amount");
            None
        }
    }
}

/// Parse a date from a millisecond Unix timestamp or a free-form date string.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(date_from_millis),
        Value::String(s) => parse_date_str(s),
        _ => None,
    }
}

/// Parse a free-form date string, discarding any time-of-day component.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        return match s.len() {
            // MMDDYYYY, as used by the grants-search list view, else YYYYMMDD
            8 => NaiveDate::parse_from_str(s, "%m%d%Y")
                .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
                .ok(),
            11.. => s.parse::<i64>().ok().and_then(date_from_millis),
            _ => None,
        };
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    {
        return Some(date);
    }

    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt.date());
    }

    // Trailing timezone names ("... 12:00:00 AM EST") are not parseable by
    // chrono; fall back to the leading date portion.
    let leading: Vec<&str> = s.split_whitespace().take(3).collect();
    if leading.len() == 3 {
        let candidate = leading.join(" ");
        if let Some(date) = DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&candidate, fmt).ok())
        {
            return Some(date);
        }
    }
    if let Some(first) = s.split_whitespace().next() {
        if first != s {
            if let Some(date) = parse_date_str(first) {
                return Some(date);
            }
        }
    }

    debug!(value = raw, "could not parse date");
    None
}

fn date_from_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}
