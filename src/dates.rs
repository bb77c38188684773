//! Date canonicalization
//!
//! Every date stored by shelfish is a `YYYY-MM-DD HH:MM:SS` UTC string. Stored this way
//! the values sort lexicographically in SQLite and compare the same way in Rust.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Canonical storage format
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `DD/MM/YYYY HH:MM:SS`, as exported by some spreadsheet tools
const DAY_FIRST_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// The kinds of date value the canonicalizer accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateInput<'a> {
    Native(DateTime<Utc>),
    EpochMillis(i64),
    Text(&'a str),
}

impl From<DateTime<Utc>> for DateInput<'_> {
    fn from(value: DateTime<Utc>) -> Self {
        DateInput::Native(value)
    }
}

impl From<i64> for DateInput<'_> {
    fn from(value: i64) -> Self {
        DateInput::EpochMillis(value)
    }
}

impl<'a> From<&'a str> for DateInput<'a> {
    fn from(value: &'a str) -> Self {
        DateInput::Text(value)
    }
}

impl<'a> From<&'a String> for DateInput<'a> {
    fn from(value: &'a String) -> Self {
        DateInput::Text(value.as_str())
    }
}

impl<'a> DateInput<'a> {
    /// Interpret an untrusted JSON value as a date: numbers are epoch milliseconds,
    /// strings are textual dates, anything else is rejected.
    pub fn from_json(value: &'a Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(DateInput::EpochMillis)
                .ok_or_else(|| Error::DateFormat(format!("number out of range: {}", n))),
            Value::String(s) => Ok(DateInput::Text(s.as_str())),
            other => Err(Error::DateFormat(format!("unsupported value: {}", other))),
        }
    }
}

/// Parse any accepted date input into a UTC timestamp
pub fn parse_date<'a>(input: impl Into<DateInput<'a>>) -> Result<DateTime<Utc>> {
    match input.into() {
        DateInput::Native(dt) => Ok(dt),
        DateInput::EpochMillis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| Error::DateFormat(format!("epoch millis out of range: {}", ms))),
        DateInput::Text(text) => parse_text(text.trim()),
    }
}

fn parse_text(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, DAY_FIRST_FORMAT) {
        return Ok(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, CANONICAL_FORMAT) {
        return Ok(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(Error::DateFormat(text.to_string()))
}

/// Convert any accepted date input to the canonical storage string
pub fn canonicalize<'a>(input: impl Into<DateInput<'a>>) -> Result<String> {
    Ok(parse_date(input)?.format(CANONICAL_FORMAT).to_string())
}

/// The current time in canonical form
pub fn now_canonical() -> String {
    Utc::now().format(CANONICAL_FORMAT).to_string()
}

/// Human-readable rendering, e.g. `19th Mar '16, 02:14`
pub fn display_date(canonical: &str) -> Result<String> {
    let dt = parse_date(canonical)?;
    let day = dt.day();
    Ok(format!(
        "{}{} {} '{}, {}",
        day,
        day_suffix(day),
        dt.format("%b"),
        dt.format("%y"),
        dt.format("%H:%M")
    ))
}

fn day_suffix(day: u32) -> &'static str {
    if (4..=20).contains(&day) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// True when `date` is at least `hours` before `now`.
/// A window too large to represent is never exceeded.
pub fn older_than_hours(hours: i64, date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match Duration::try_hours(hours).and_then(|window| now.checked_sub_signed(window)) {
        Some(cutoff) => date <= cutoff,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_is_canonical_origin() {
        assert_eq!(canonicalize(0i64).unwrap(), "1970-01-01 00:00:00");
        let native = Utc.timestamp_millis_opt(0).unwrap();
        assert_eq!(canonicalize(native).unwrap(), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_day_first_text() {
        assert_eq!(
            canonicalize("19/03/2016 02:14:25").unwrap(),
            "2016-03-19 02:14:25"
        );
    }

    #[test]
    fn test_rfc2822_feed_dates() {
        assert_eq!(
            canonicalize("Fri, 19 Jul 2024 13:39:56 +0000").unwrap(),
            "2024-07-19 13:39:56"
        );
        assert_eq!(
            canonicalize("Fri, 19 Jul 2024 15:39:56 +0200").unwrap(),
            "2024-07-19 13:39:56"
        );
    }

    #[test]
    fn test_canonical_and_iso_inputs_are_stable() {
        assert_eq!(
            canonicalize("2024-07-19 13:39:56").unwrap(),
            "2024-07-19 13:39:56"
        );
        assert_eq!(
            canonicalize("2024-07-19T13:39:56Z").unwrap(),
            "2024-07-19 13:39:56"
        );
        assert_eq!(canonicalize("2024-07-19").unwrap(), "2024-07-19 00:00:00");
    }

    #[test]
    fn test_unrecognized_inputs_fail() {
        assert!(matches!(
            canonicalize("last tuesday"),
            Err(Error::DateFormat(_))
        ));
        let value = serde_json::json!({ "when": "now" });
        assert!(matches!(
            DateInput::from_json(&value),
            Err(Error::DateFormat(_))
        ));
        assert!(matches!(
            DateInput::from_json(&Value::Bool(true)),
            Err(Error::DateFormat(_))
        ));
    }

    #[test]
    fn test_json_millis() {
        let value = serde_json::json!(1_458_353_665_000i64);
        let input = DateInput::from_json(&value).unwrap();
        assert_eq!(canonicalize(input).unwrap(), "2016-03-19 02:14:25");

        let float = serde_json::json!(1_458_353_665_000.0f64);
        let input = DateInput::from_json(&float).unwrap();
        assert_eq!(canonicalize(input).unwrap(), "2016-03-19 02:14:25");
    }

    #[test]
    fn test_display_date() {
        let canonical = canonicalize("19/03/2016 02:14:25").unwrap();
        assert_eq!(display_date(&canonical).unwrap(), "19th Mar '16, 02:14");
        assert_eq!(
            display_date("2021-01-01 09:05:00").unwrap(),
            "1st Jan '21, 09:05"
        );
        assert_eq!(
            display_date("2021-01-22 09:05:00").unwrap(),
            "22nd Jan '21, 09:05"
        );
        assert_eq!(
            display_date("2021-01-13 09:05:00").unwrap(),
            "13th Jan '21, 09:05"
        );
    }

    #[test]
    fn test_older_than_hours() {
        let now = Utc::now();
        assert!(!older_than_hours(24, now, now));
        assert!(!older_than_hours(1, now, now));
        assert!(older_than_hours(24, now - Duration::hours(48), now));
        assert!(older_than_hours(1, now - Duration::hours(48), now));
    }

    #[test]
    fn test_older_than_hours_with_huge_window() {
        let now = Utc::now();
        let long_ago = now - Duration::days(365 * 50);
        assert!(!older_than_hours(i64::MAX / 2, long_ago, now));
        assert!(!older_than_hours(i64::MAX, long_ago, now));
    }
}
