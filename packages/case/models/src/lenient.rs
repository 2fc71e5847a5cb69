//! Forgiving decoders for optional case fields.
//!
//! Case records are edited through free-form admin forms, so a coordinate
//! may arrive as `-17.83`, `"-17.83"`, or `""`, and a phone number as a
//! bare integer. A field that cannot be read is treated as unset instead of
//! failing the whole record; only `id` and `status` are load-bearing.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

/// A coordinate given as a number or a numeric string. Blank, non-finite,
/// and non-numeric values become `None`.
///
/// # Errors
///
/// Never fails on well-formed input of any type; only propagates errors
/// from the underlying deserializer.
#[allow(clippy::cast_precision_loss)]
pub fn coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Float(n)) => Some(n),
        Some(Raw::Int(n)) => Some(n as f64),
        Some(Raw::UInt(n)) => Some(n as f64),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok(),
        Some(Raw::Other(_)) | None => None,
    };
    Ok(value.filter(|n| n.is_finite()))
}

/// A text field. Numbers are kept in their decimal form; anything else
/// that is not a string becomes `None`.
///
/// # Errors
///
/// Only propagates errors from the underlying deserializer.
pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Int(n)) => Some(n.to_string()),
        Some(Raw::UInt(n)) => Some(n.to_string()),
        Some(Raw::Float(n)) => Some(n.to_string()),
        Some(Raw::Other(_)) | None => None,
    })
}

/// Like [`text`], with unreadable values becoming the empty string.
///
/// # Errors
///
/// Only propagates errors from the underlying deserializer.
pub fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Fields {
        #[serde(default, deserialize_with = "super::coordinate")]
        lat: Option<f64>,
        #[serde(default, deserialize_with = "super::text")]
        phone: Option<String>,
    }

    fn read(json: &str) -> (Option<f64>, Option<String>) {
        let parsed: Fields = serde_json::from_str(json).unwrap();
        (parsed.lat, parsed.phone)
    }

    #[test]
    fn coordinates_accept_numbers_and_numeric_strings() {
        assert_eq!(read(r#"{"lat": -17.83}"#).0, Some(-17.83));
        assert_eq!(read(r#"{"lat": " -17.83 "}"#).0, Some(-17.83));
        assert_eq!(read(r#"{"lat": 31}"#).0, Some(31.0));
    }

    #[test]
    fn unreadable_coordinates_are_unset() {
        assert_eq!(read(r#"{"lat": ""}"#).0, None);
        assert_eq!(read(r#"{"lat": "north"}"#).0, None);
        assert_eq!(read(r#"{"lat": "NaN"}"#).0, None);
        assert_eq!(read(r#"{"lat": null}"#).0, None);
        assert_eq!(read(r#"{"lat": {"deg": 17}}"#).0, None);
        assert_eq!(read("{}").0, None);
    }

    #[test]
    fn text_keeps_numbers_and_drops_structures() {
        assert_eq!(read(r#"{"phone": 263771234567}"#).1.as_deref(), Some("263771234567"));
        assert_eq!(read(r#"{"phone": "+263 77"}"#).1.as_deref(), Some("+263 77"));
        assert_eq!(read(r#"{"phone": [1, 2]}"#).1, None);
        assert_eq!(read(r#"{"phone": true}"#).1, None);
    }
}
