//! Cell-level parsing helpers shared by the normalizer and the analyzers.
//!
//! Timestamps in incident exports arrive in whatever shape the exporting tool
//! prefers, so [`parse_timestamp()`] tries a fixed list of layouts and returns
//! `None` instead of failing. Callers count the misses.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use heck::ToSnakeCase;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%d %H:%M:%S %z"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%d %b %Y",
];

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.naive_utc());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(value, fmt) {
            return Ok(parsed.naive_utc());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Best-effort timestamp parsing. Accepts full datetimes, bare dates (read as
/// midnight) and epoch seconds or milliseconds.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let stripped = trimmed
        .strip_suffix(" UTC")
        .or_else(|| trimmed.strip_suffix(" GMT"))
        .unwrap_or(trimmed);
    if let Ok(parsed) = parse_naive_datetime(stripped) {
        return Some(parsed);
    }
    if let Some(naive) = stripped.strip_suffix('Z')
        && let Ok(parsed) = parse_naive_datetime(naive)
    {
        return Some(parsed);
    }
    if let Ok(date) = parse_naive_date(stripped) {
        return date.and_hms_opt(0, 0, 0);
    }
    parse_epoch(stripped)
}

fn parse_epoch(value: &str) -> Option<NaiveDateTime> {
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let number: i64 = value.parse().ok()?;
    match value.len() {
        10 => DateTime::from_timestamp(number, 0).map(|dt| dt.naive_utc()),
        13 => DateTime::from_timestamp_millis(number).map(|dt| dt.naive_utc()),
        _ => None,
    }
}

/// Canonical form used when comparing raw export headers against registry
/// entries: `Short Description`, `shortDescription` and `short_description`
/// all compare equal.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_snake_case()
}

pub fn is_numeric_token(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed.replace(',', "").parse::<f64>().is_ok()
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn normalize_column_name_snake_cases_headers() {
        assert_eq!(normalize_column_name("Short Description"), "short_description");
        assert_eq!(normalize_column_name("sys_created_on"), "sys_created_on");
        assert_eq!(normalize_column_name("incidentId"), "incident_id");
        assert_eq!(normalize_column_name(" Alert ID "), "alert_id");
    }

    #[test]
    fn parse_timestamp_supports_common_export_layouts() {
        let expected = at(2025, 1, 15, 10, 30, 0);
        assert_eq!(parse_timestamp("2025-01-15 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-15T10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-15T10:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-15T10:30:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-15 10:30:00 UTC"), Some(expected));
        assert_eq!(parse_timestamp("01/15/2025 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("15/01/2025 10:30"), Some(expected));
    }

    #[test]
    fn parse_timestamp_normalizes_offsets_to_utc() {
        assert_eq!(
            parse_timestamp("2025-01-15T12:30:00+02:00"),
            Some(at(2025, 1, 15, 10, 30, 0))
        );
    }

    #[test]
    fn parse_timestamp_reads_dates_and_epochs() {
        assert_eq!(parse_timestamp("2025-01-15"), Some(at(2025, 1, 15, 0, 0, 0)));
        assert_eq!(parse_timestamp("1736937000"), Some(at(2025, 1, 15, 10, 30, 0)));
        assert_eq!(
            parse_timestamp("1736937000000"),
            Some(at(2025, 1, 15, 10, 30, 0))
        );
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("invalid"), None);
        assert_eq!(parse_timestamp("12345"), None);
        assert_eq!(parse_timestamp("2025-13-45"), None);
    }

    #[test]
    fn numeric_tokens_accept_grouping() {
        assert!(is_numeric_token("1,200"));
        assert!(is_numeric_token(" 3.5 "));
        assert!(!is_numeric_token("5 minutes"));
        assert!(!is_numeric_token(""));
    }
}
