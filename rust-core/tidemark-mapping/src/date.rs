// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Date parsing shared by the `date` validator, dynamic date detection and
// `_timestamp` normalization.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Layouts tried, after RFC 3339, for strings with no explicit format.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d",
    "%Y/%m/%d",
];

/// Parse `s` with a chrono format string, with or without an offset.
fn parse_with(s: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(s, format) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a date string. With a `format`, only that layout is accepted;
/// otherwise RFC 3339 and then [`DEFAULT_DATE_FORMATS`].
pub fn parse_date_str(s: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    match format {
        Some(format) => parse_with(s, format),
        None => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| DEFAULT_DATE_FORMATS.iter().find_map(|f| parse_with(s, f))),
    }
}

/// Parse a JSON value as a date: a string (see [`parse_date_str`]) or an
/// integer number of milliseconds since the Unix epoch.
pub fn parse_date(value: &Value, format: Option<&str>) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s, format),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rfc3339_with_offset_is_normalized_to_utc() {
        let dt = parse_date_str("2024-03-01T12:00:00+02:00", None).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_709_287_200_000);
    }

    #[test]
    fn test_default_layouts() {
        assert!(parse_date_str("2024-03-01", None).is_some());
        assert!(parse_date_str("2024/03/01 08:30:00", None).is_some());
        assert!(parse_date_str("2024-03-01T08:30:00.125", None).is_some());
        assert!(parse_date_str("OK", None).is_none());
        assert!(parse_date_str("3.14", None).is_none());
    }

    #[test]
    fn test_explicit_format_only() {
        assert!(parse_date_str("01.03.2024", Some("%d.%m.%Y")).is_some());
        assert!(parse_date_str("2024-03-01", Some("%d.%m.%Y")).is_none());
    }

    #[test]
    fn test_epoch_millis() {
        let dt = parse_date(&json!(1_700_000_000_000i64), None).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_000);
        assert!(parse_date(&json!(1.5), None).is_none());
        assert!(parse_date(&json!(true), None).is_none());
    }
}
