//! Records for the non-case dashboard collections.
//!
//! Field names follow the store schema, which mixes `snake_case`
//! (`licence_number`, `member_in_charge`) and `camelCase` (`isSorted`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::record_id;

/// Anything with a server-assigned creation time.
pub trait Timestamped {
    /// When the record was created.
    fn created(&self) -> Option<DateTime<Utc>>;
}

impl Timestamped for crate::Incident {
    fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }
}

/// A traffic violation logged against a licence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficViolation {
    /// Record ID.
    #[serde(deserialize_with = "record_id::deserialize")]
    pub id: String,
    /// Vehicle licence number.
    pub licence_number: String,
    /// Whether the violation has been dealt with.
    #[serde(rename = "isSorted", default)]
    pub is_sorted: bool,
    /// Creation time.
    #[serde(default, with = "crate::timestamp")]
    pub created: Option<DateTime<Utc>>,
    /// Last modification time.
    #[serde(default, with = "crate::timestamp")]
    pub updated: Option<DateTime<Utc>>,
}

impl Timestamped for TrafficViolation {
    fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }
}

/// Body for creating a traffic violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrafficViolation {
    /// Vehicle licence number.
    pub licence_number: String,
    /// Whether the violation has been dealt with.
    #[serde(rename = "isSorted")]
    pub is_sorted: bool,
}

/// A police station contact card (`contacts` collection).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliceStation {
    /// Record ID. Empty for stations not yet created.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Station name.
    pub station: String,
    /// Province.
    pub province: String,
    /// District.
    pub district: String,
    /// Street location.
    pub location: String,
    /// Whether the station is operating.
    pub active: bool,
    /// Landline number.
    pub station_number: String,
    /// `WhatsApp` contact number.
    pub whatsapp_number: String,
    /// Officer in charge.
    pub member_in_charge: String,
    /// Officer in charge's number.
    pub member_in_charge_number: String,
    /// Specialty (traffic, CID, ...).
    pub specialty: String,
    /// Creation time.
    #[serde(with = "crate::timestamp", skip_serializing)]
    pub created: Option<DateTime<Utc>>,
}

impl PoliceStation {
    /// Checks the fields the station form requires.
    ///
    /// # Errors
    ///
    /// Returns [`StationValidationError`] listing every missing field.
    pub fn validate(&self) -> Result<(), StationValidationError> {
        let mut missing = BTreeMap::new();
        let required = [
            ("station", &self.station, "Station name is required"),
            ("province", &self.province, "Province is required"),
            ("district", &self.district, "District is required"),
            (
                "member_in_charge",
                &self.member_in_charge,
                "Member in charge is required",
            ),
        ];
        for (field, value, message) in required {
            if value.trim().is_empty() {
                missing.insert(field, message);
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StationValidationError { missing })
        }
    }
}

impl Timestamped for PoliceStation {
    fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }
}

/// Error returned by [`PoliceStation::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationValidationError {
    /// Field name to user-facing message.
    pub missing: BTreeMap<&'static str, &'static str>,
}

impl std::fmt::Display for StationValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<&str> = self.missing.values().copied().collect();
        write!(f, "invalid station: {}", messages.join(", "))
    }
}

impl std::error::Error for StationValidationError {}

/// A public notice (`news` collection).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Publication {
    /// Record ID.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Headline.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Author name.
    pub author: String,
    /// Attached file name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Creation time.
    #[serde(with = "crate::timestamp", skip_serializing)]
    pub created: Option<DateTime<Utc>>,
}

impl Publication {
    /// URL of the attached file under the store's file endpoint.
    #[must_use]
    pub fn file_url(&self, base_url: &str, collection: &str) -> Option<String> {
        let file = self.file.as_deref().filter(|f| !f.is_empty())?;
        Some(format!(
            "{}/api/files/{collection}/{}/{file}",
            base_url.trim_end_matches('/'),
            self.id
        ))
    }
}

impl Timestamped for Publication {
    fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }
}

/// Kind of citizen feedback.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionFlag {
    /// A complaint about service.
    Complaint,
    /// A general comment.
    Comment,
    /// A suggestion for improvement.
    Suggestion,
    /// Unclassified.
    Other,
}

impl SuggestionFlag {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Complaint => "Complaint",
            Self::Comment => "Comment",
            Self::Suggestion => "Suggestion",
            Self::Other => "Other",
        }
    }
}

/// An entry in the suggestion box (`comments` collection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Record ID.
    #[serde(deserialize_with = "record_id::deserialize")]
    pub id: String,
    /// Free-text feedback.
    #[serde(default)]
    pub comment: String,
    /// Raw flag as stored. See [`Suggestion::flag`].
    #[serde(default, rename = "flag")]
    pub raw_flag: Option<String>,
    /// Creation time.
    #[serde(default, with = "crate::timestamp")]
    pub created: Option<DateTime<Utc>>,
}

impl Suggestion {
    /// Parsed flag; unknown or missing values map to
    /// [`SuggestionFlag::Other`].
    #[must_use]
    pub fn flag(&self) -> SuggestionFlag {
        self.raw_flag
            .as_deref()
            .and_then(|f| f.trim().parse().ok())
            .unwrap_or(SuggestionFlag::Other)
    }
}

impl Timestamped for Suggestion {
    fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_validation_lists_missing_fields() {
        let station = PoliceStation {
            station: "Central".to_string(),
            ..PoliceStation::default()
        };
        let err = station.validate().unwrap_err();
        assert!(err.missing.contains_key("province"));
        assert!(err.missing.contains_key("district"));
        assert!(err.missing.contains_key("member_in_charge"));
        assert!(!err.missing.contains_key("station"));
    }

    #[test]
    fn violation_reads_is_sorted() {
        let v: TrafficViolation = serde_json::from_value(serde_json::json!({
            "id": "v1",
            "licence_number": "ABC 1234",
            "isSorted": true,
            "created": "2024-01-02 03:04:05.000Z"
        }))
        .unwrap();
        assert!(v.is_sorted);
        assert!(v.created().is_some());
    }

    #[test]
    fn suggestion_flag_falls_back_to_other() {
        let s: Suggestion = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "comment": "More patrols please",
            "flag": "PRAISE"
        }))
        .unwrap();
        assert_eq!(s.flag(), SuggestionFlag::Other);

        let s: Suggestion = serde_json::from_value(serde_json::json!({
            "id": "c2",
            "flag": "COMPLAINT"
        }))
        .unwrap();
        assert_eq!(s.flag(), SuggestionFlag::Complaint);
    }

    #[test]
    fn publication_file_url() {
        let p = Publication {
            id: "n1".to_string(),
            file: Some("notice.pdf".to_string()),
            ..Publication::default()
        };
        assert_eq!(
            p.file_url("http://127.0.0.1:8090/", "news").as_deref(),
            Some("http://127.0.0.1:8090/api/files/news/n1/notice.pdf")
        );
        assert!(Publication::default().file_url("http://x", "news").is_none());
    }
}
