//! Serde helpers for record store timestamps.
//!
//! The store writes timestamps as `"2024-05-01 10:15:00.123Z"` (space
//! separator) and uses an empty string for unset date fields. RFC 3339 with
//! a `T` separator is accepted as well.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serializer};

/// Format used when writing timestamps back to the store.
pub const STORE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// Parses a store timestamp. Returns `None` for empty or unparseable input.
#[must_use]
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = trimmed.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .map(|n| n.and_utc())
}

/// Formats a timestamp the way the store writes them.
#[must_use]
pub fn format(dt: &DateTime<Utc>) -> String {
    dt.format(STORE_FORMAT).to_string()
}

/// Serializes an optional timestamp in store format (`null` when unset).
///
/// # Errors
///
/// Propagates serializer errors.
#[allow(clippy::ref_option)]
pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(dt) => serializer.serialize_str(&format(dt)),
        None => serializer.serialize_none(),
    }
}

/// Deserializes an optional timestamp, mapping `null`, `""`, garbage, and
/// non-string values to `None`.
///
/// # Errors
///
/// Only propagates errors from the underlying deserializer.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(raw)) => parse(&raw),
        Some(Raw::Other(_)) | None => None,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike as _, Timelike as _};

    use super::*;

    #[test]
    fn parses_store_format() {
        let dt = parse("2024-05-01 10:15:00.123Z").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn parses_rfc3339() {
        let dt = parse("2024-05-01T10:15:00+02:00").unwrap();
        assert_eq!(dt.hour(), 8);
    }

    #[test]
    fn empty_and_garbage_are_none() {
        assert!(parse("").is_none());
        assert!(parse("   ").is_none());
        assert!(parse("yesterday").is_none());
    }

    #[test]
    fn format_round_trips() {
        let dt = parse("2024-05-01 10:15:00.123Z").unwrap();
        assert_eq!(format(&dt), "2024-05-01 10:15:00.123Z");
    }
}
