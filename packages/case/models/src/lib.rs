#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Case, incident status, and dashboard resource types.
//!
//! An [`Incident`] is a case record as stored in the `cases` collection of
//! the record store. Realtime events may carry only part of a record, so
//! they are decoded into an [`IncidentPatch`] and merged into the full
//! record by the feed.
//!
//! The remaining dashboard collections (traffic violations, police station
//! contacts, publications, suggestions) live in [`resources`].

pub mod lenient;
pub mod resources;
pub mod timestamp;

use std::convert::Infallible;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Lifecycle status of a case.
///
/// The four canonical values are matched case-insensitively. Anything else
/// (e.g. the legacy `"In Progress"` or `"closed"`) is kept verbatim in
/// [`CaseStatus::Other`] and treated as active.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CaseStatus {
    /// Newly reported, nobody attending yet.
    Open,
    /// An officer is attending.
    Ongoing,
    /// Closed with an outcome.
    Resolved,
    /// Withdrawn or raised in error.
    Cancelled,
    /// Free-text legacy status.
    Other(String),
}

impl CaseStatus {
    /// Returns `true` for `Resolved` and `Cancelled`, the statuses that take
    /// a case off the live map.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    /// Returns `true` if a case with this status belongs on the live map.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns `true` for `Ongoing` and the legacy `"In Progress"` value.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        match self {
            Self::Ongoing => true,
            Self::Other(raw) => raw.trim().eq_ignore_ascii_case("in progress"),
            _ => false,
        }
    }

    /// Position of this status in the case progress stepper
    /// (open → in progress → resolved → closed).
    #[must_use]
    pub fn progress_step(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Resolved => 2,
            Self::Cancelled => 3,
            Self::Ongoing => 1,
            Self::Other(raw) if raw.trim().eq_ignore_ascii_case("closed") => 3,
            other if other.is_in_progress() => 1,
            Self::Other(_) => 0,
        }
    }

    /// Returns the string form stored in the record store.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "Open",
            Self::Ongoing => "Ongoing",
            Self::Resolved => "Resolved",
            Self::Cancelled => "Cancelled",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for CaseStatus {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("open") {
            Self::Open
        } else if trimmed.eq_ignore_ascii_case("ongoing") {
            Self::Ongoing
        } else if trimmed.eq_ignore_ascii_case("resolved") {
            Self::Resolved
        } else if trimmed.eq_ignore_ascii_case("cancelled") {
            Self::Cancelled
        } else {
            Self::Other(value)
        }
    }
}

impl From<&str> for CaseStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<CaseStatus> for String {
    fn from(value: CaseStatus) -> Self {
        match value {
            CaseStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for CaseStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker and alert category derived from a case title.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MarkerCategory {
    /// Distress call. Always takes priority.
    Sos,
    /// Road accident or traffic incident.
    Collision,
    /// Crime or robbery report.
    Robbery,
    /// Anything else.
    Default,
}

impl MarkerCategory {
    /// Classifies a case title.
    ///
    /// Case-insensitive substring matching, first match wins in the order
    /// `sos`, `accident`/`traffic`, `crime`/`robbery`.
    #[must_use]
    pub fn classify(title: &str) -> Self {
        let lower = title.to_lowercase();

        if lower.contains("sos") {
            return Self::Sos;
        }
        if contains_any(&lower, &["accident", "traffic"]) {
            return Self::Collision;
        }
        if contains_any(&lower, &["crime", "robbery"]) {
            return Self::Robbery;
        }

        Self::Default
    }

    /// Whether markers of this category pulse on the map.
    #[must_use]
    pub const fn pulses(self) -> bool {
        matches!(self, Self::Sos)
    }

    /// Static icon path used by the map frontend.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Sos => "/images/sos.png",
            Self::Collision => "/images/collision.png",
            Self::Robbery => "/images/robbery.png",
            Self::Default => "/images/marker.png",
        }
    }

    /// Returns all variants in classification priority order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Sos, Self::Collision, Self::Robbery, Self::Default]
    }
}

/// Shorthand for [`MarkerCategory::classify`].
#[must_use]
pub fn classify_title(title: &str) -> MarkerCategory {
    MarkerCategory::classify(title)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates a coordinate pair.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A case record from the `cases` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Record ID, stable for the lifetime of the record.
    #[serde(deserialize_with = "record_id::deserialize")]
    pub id: String,
    /// Free-text classification label (e.g. `"SOS Alert"`).
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub title: String,
    /// Current status.
    pub status: CaseStatus,
    /// Latitude (WGS84). Required for map placement.
    #[serde(default, deserialize_with = "lenient::coordinate")]
    pub latitude: Option<f64>,
    /// Longitude (WGS84). Required for map placement.
    #[serde(default, deserialize_with = "lenient::coordinate")]
    pub longitude: Option<f64>,
    /// Reporter's description.
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: Option<String>,
    /// Human-readable location.
    #[serde(default, deserialize_with = "lenient::text")]
    pub address: Option<String>,
    /// Priority label, free text.
    #[serde(default, deserialize_with = "lenient::text")]
    pub priority: Option<String>,
    /// Reporter's phone number.
    #[serde(default, deserialize_with = "lenient::text")]
    pub phone_number: Option<String>,
    /// Phone number of the officer the case is assigned to.
    #[serde(default, deserialize_with = "lenient::text")]
    pub assigned_to: Option<String>,
    /// Operator notes.
    #[serde(default, deserialize_with = "lenient::text")]
    pub notes: Option<String>,
    /// Additional notes captured when attending.
    #[serde(default, deserialize_with = "lenient::text")]
    pub additional_notes: Option<String>,
    /// Planned follow-up.
    #[serde(default, deserialize_with = "lenient::text")]
    pub next_steps: Option<String>,
    /// Who reported the case (citizen, officer, ...).
    #[serde(default, deserialize_with = "lenient::text")]
    pub reporter_type: Option<String>,
    /// Server-assigned creation time.
    #[serde(default, with = "timestamp")]
    pub created: Option<DateTime<Utc>>,
    /// Server-assigned last modification time.
    #[serde(default, with = "timestamp")]
    pub updated: Option<DateTime<Utc>>,
}

impl Incident {
    /// Creates a minimal incident with only the required fields set.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: CaseStatus) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status,
            latitude: None,
            longitude: None,
            description: None,
            address: None,
            priority: None,
            phone_number: None,
            assigned_to: None,
            notes: None,
            additional_notes: None,
            next_steps: None,
            reporter_type: None,
            created: None,
            updated: None,
        }
    }

    /// Builds a full incident from a patch.
    ///
    /// Returns `None` unless the patch carries both an `id` and a `status`.
    #[must_use]
    pub fn from_patch(patch: &IncidentPatch) -> Option<Self> {
        let id = patch.id.clone()?;
        let status = patch.status.clone()?;
        let mut incident = Self::new(id, String::new(), status);
        incident.merge(patch);
        Some(incident)
    }

    /// Overwrites every field the patch carries. The `id` is never changed.
    pub fn merge(&mut self, patch: &IncidentPatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(status) = &patch.status {
            self.status = status.clone();
        }
        merge_field(&mut self.latitude, patch.latitude);
        merge_field(&mut self.longitude, patch.longitude);
        merge_field(&mut self.description, patch.description.clone());
        merge_field(&mut self.address, patch.address.clone());
        merge_field(&mut self.priority, patch.priority.clone());
        merge_field(&mut self.phone_number, patch.phone_number.clone());
        merge_field(&mut self.assigned_to, patch.assigned_to.clone());
        merge_field(&mut self.notes, patch.notes.clone());
        merge_field(&mut self.additional_notes, patch.additional_notes.clone());
        merge_field(&mut self.next_steps, patch.next_steps.clone());
        merge_field(&mut self.reporter_type, patch.reporter_type.clone());
        merge_field(&mut self.created, patch.created);
        merge_field(&mut self.updated, patch.updated);
    }

    /// Map category derived from the title.
    #[must_use]
    pub fn category(&self) -> MarkerCategory {
        MarkerCategory::classify(&self.title)
    }

    /// Coordinates, if both latitude and longitude are known.
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates::new(self.latitude?, self.longitude?))
    }
}

fn merge_field<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// A possibly partial case record, as carried by realtime events.
///
/// Every field is optional so that a payload such as
/// `{"id": "1", "status": "Resolved"}` can still be merged into the
/// complete record already held in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncidentPatch {
    /// Record ID.
    #[serde(
        deserialize_with = "record_id::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Title.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    /// Status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
    /// Latitude.
    #[serde(
        deserialize_with = "lenient::coordinate",
        skip_serializing_if = "Option::is_none"
    )]
    pub latitude: Option<f64>,
    /// Longitude.
    #[serde(
        deserialize_with = "lenient::coordinate",
        skip_serializing_if = "Option::is_none"
    )]
    pub longitude: Option<f64>,
    /// Description.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    /// Address.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub address: Option<String>,
    /// Priority.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<String>,
    /// Reporter phone number.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone_number: Option<String>,
    /// Assigned officer phone number.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_to: Option<String>,
    /// Notes.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<String>,
    /// Additional notes.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_notes: Option<String>,
    /// Next steps.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_steps: Option<String>,
    /// Reporter type.
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub reporter_type: Option<String>,
    /// Creation time.
    #[serde(with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last modification time.
    #[serde(with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl From<Incident> for IncidentPatch {
    fn from(incident: Incident) -> Self {
        Self {
            id: Some(incident.id),
            title: Some(incident.title),
            status: Some(incident.status),
            latitude: incident.latitude,
            longitude: incident.longitude,
            description: incident.description,
            address: incident.address,
            priority: incident.priority,
            phone_number: incident.phone_number,
            assigned_to: incident.assigned_to,
            notes: incident.notes,
            additional_notes: incident.additional_notes,
            next_steps: incident.next_steps,
            reporter_type: incident.reporter_type,
            created: incident.created,
            updated: incident.updated,
        }
    }
}

/// Record IDs are strings in the store, but fixtures and some legacy
/// exports use bare integers. Both are accepted.
pub mod record_id {
    use serde::{Deserialize, Deserializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        UInt(u64),
    }

    impl From<RawId> for String {
        fn from(raw: RawId) -> Self {
            match raw {
                RawId::Text(s) => s,
                RawId::Int(n) => n.to_string(),
                RawId::UInt(n) => n.to_string(),
            }
        }
    }

    /// Deserializes a required record ID. Empty strings are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither a string nor an integer, or
    /// is an empty string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = String::from(RawId::deserialize(deserializer)?);
        if id.trim().is_empty() {
            return Err(D::Error::custom("record id is empty"));
        }
        Ok(id)
    }

    /// Deserializes an optional record ID. Empty strings become `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither null, a string, nor an
    /// integer.
    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<RawId>::deserialize(deserializer)?
            .map(String::from)
            .filter(|id| !id.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_priority_order() {
        assert_eq!(classify_title("Robbery in progress"), MarkerCategory::Robbery);
        assert_eq!(classify_title("SOS - Accident"), MarkerCategory::Sos);
        assert_eq!(classify_title("Routine patrol"), MarkerCategory::Default);
        assert_eq!(classify_title("Traffic jam"), MarkerCategory::Collision);
        assert_eq!(classify_title("CRIME scene"), MarkerCategory::Robbery);
        assert_eq!(
            classify_title("Accident after robbery"),
            MarkerCategory::Collision
        );
    }

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(CaseStatus::from("resolved"), CaseStatus::Resolved);
        assert_eq!(CaseStatus::from(" Cancelled "), CaseStatus::Cancelled);
        assert_eq!(
            CaseStatus::from("In Progress"),
            CaseStatus::Other("In Progress".to_string())
        );
        assert!(CaseStatus::from("In Progress").is_active());
        assert!(CaseStatus::from("In Progress").is_in_progress());
        assert!(CaseStatus::Resolved.is_terminal());
    }

    #[test]
    fn progress_steps() {
        assert_eq!(CaseStatus::Open.progress_step(), 0);
        assert_eq!(CaseStatus::from("in progress").progress_step(), 1);
        assert_eq!(CaseStatus::Resolved.progress_step(), 2);
        assert_eq!(CaseStatus::from("closed").progress_step(), 3);
        assert_eq!(CaseStatus::from("whatever").progress_step(), 0);
    }

    #[test]
    fn incident_deserializes_store_record() {
        let value = serde_json::json!({
            "id": "abc123",
            "title": "SOS Alert",
            "status": "Open",
            "latitude": -17.8292,
            "longitude": 31.0522,
            "phoneNumber": "+263700000000",
            "created": "2024-05-01 10:15:00.000Z",
            "updated": ""
        });
        let incident: Incident = serde_json::from_value(value).unwrap();
        assert_eq!(incident.id, "abc123");
        assert_eq!(incident.status, CaseStatus::Open);
        assert_eq!(incident.category(), MarkerCategory::Sos);
        assert!(incident.created.is_some());
        assert!(incident.updated.is_none());
        assert!(incident.coordinates().is_some());
    }

    #[test]
    fn patch_accepts_numeric_id_and_partial_fields() {
        let patch: IncidentPatch =
            serde_json::from_value(serde_json::json!({"id": 1, "status": "Resolved"})).unwrap();
        assert_eq!(patch.id.as_deref(), Some("1"));
        assert_eq!(patch.status, Some(CaseStatus::Resolved));
        assert!(patch.title.is_none());
    }

    #[test]
    fn merge_keeps_fields_missing_from_patch() {
        let mut incident = Incident::new("1", "Accident on Main St", CaseStatus::Open);
        incident.address = Some("Main St".to_string());

        let patch = IncidentPatch {
            id: Some("1".to_string()),
            status: Some(CaseStatus::Ongoing),
            ..IncidentPatch::default()
        };
        incident.merge(&patch);

        assert_eq!(incident.status, CaseStatus::Ongoing);
        assert_eq!(incident.title, "Accident on Main St");
        assert_eq!(incident.address.as_deref(), Some("Main St"));
    }

    #[test]
    fn from_patch_requires_id_and_status() {
        let no_status = IncidentPatch {
            id: Some("1".to_string()),
            ..IncidentPatch::default()
        };
        assert!(Incident::from_patch(&no_status).is_none());

        let no_id = IncidentPatch {
            status: Some(CaseStatus::Open),
            ..IncidentPatch::default()
        };
        assert!(Incident::from_patch(&no_id).is_none());
    }

    #[test]
    fn snapshot_records_tolerate_form_typed_fields() {
        let incident: Incident = serde_json::from_value(serde_json::json!({
            "id": "7",
            "title": "SOS Alert",
            "status": "Open",
            "latitude": "-17.83",
            "longitude": "",
            "priority": 2,
            "created": false,
        }))
        .unwrap();
        assert_eq!(incident.latitude, Some(-17.83));
        assert_eq!(incident.longitude, None);
        assert_eq!(incident.priority.as_deref(), Some("2"));
        assert!(incident.created.is_none());
        assert!(incident.coordinates().is_none());

        let missing_status = serde_json::from_value::<Incident>(serde_json::json!({
            "id": "8",
            "latitude": -17.83,
        }));
        assert!(missing_status.is_err());
    }
}
