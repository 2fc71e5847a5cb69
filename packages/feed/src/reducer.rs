//! The active-incident set and the event reducer that maintains it.
//!
//! Invariant: an incident is in the set iff the last status observed for
//! it is neither `Resolved` nor `Cancelled`.
//!
//! Beyond that the reducer is idempotent and last-write-wins per ID:
//!
//! - a create or update carrying an older `updated` timestamp than the
//!   entry already held is ignored;
//! - a delete leaves a tombstone, so a stale update arriving afterwards
//!   cannot resurrect the record. Only a new create or a fresh snapshot
//!   clears it.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use patrol_desk_case_models::{Incident, IncidentPatch};
use patrol_desk_store_models::{RecordAction, RecordEvent};

use crate::alerts::Cue;

/// Tombstones kept before the oldest are forgotten.
pub const TOMBSTONE_CAPACITY: usize = 4096;

/// A realtime event with its record decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    /// What happened.
    pub action: RecordAction,
    /// The (possibly partial) record.
    pub record: IncidentPatch,
}

impl FeedEvent {
    /// A create event.
    #[must_use]
    pub fn create(record: impl Into<IncidentPatch>) -> Self {
        Self {
            action: RecordAction::Create,
            record: record.into(),
        }
    }

    /// An update event.
    #[must_use]
    pub fn update(record: impl Into<IncidentPatch>) -> Self {
        Self {
            action: RecordAction::Update,
            record: record.into(),
        }
    }

    /// A delete event for `id`.
    #[must_use]
    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            action: RecordAction::Delete,
            record: IncidentPatch {
                id: Some(id.into()),
                ..IncidentPatch::default()
            },
        }
    }

    /// Decodes the raw record of a store event.
    ///
    /// # Errors
    ///
    /// Returns the decode error if the record is not a case-shaped object.
    pub fn decode(event: &RecordEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            action: event.action,
            record: serde_json::from_value(event.record.clone())?,
        })
    }
}

/// Why an event left the set untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Missing `id`, or missing `status` on a create/update, or an
    /// undecodable record.
    Malformed,
    /// Older than the entry already held.
    Stale,
    /// Update for a record deleted earlier.
    Deleted,
    /// Terminal status for a record that is not in the set.
    NotVisible,
    /// Delete for a record that is not in the set.
    Absent,
}

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A new entry was added.
    Inserted {
        /// Record ID.
        id: String,
        /// Cue to play, set only for creates.
        cue: Option<Cue>,
    },
    /// An existing entry was overwritten or merged.
    Replaced {
        /// Record ID.
        id: String,
        /// Cue to play, set only for creates.
        cue: Option<Cue>,
    },
    /// An entry was removed.
    Removed {
        /// Record ID.
        id: String,
    },
    /// Nothing changed.
    Ignored {
        /// Record ID, when the event carried one.
        id: Option<String>,
        /// Why.
        reason: IgnoreReason,
    },
}

impl Transition {
    /// Returns `true` if the set changed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        !matches!(self, Self::Ignored { .. })
    }

    /// The cue this transition asks for, if any.
    #[must_use]
    pub const fn cue(&self) -> Option<Cue> {
        match self {
            Self::Inserted { cue, .. } | Self::Replaced { cue, .. } => *cue,
            Self::Removed { .. } | Self::Ignored { .. } => None,
        }
    }
}

/// One incident held in the set.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// The latest known record.
    pub incident: Incident,
    /// Arrival order; assigned on insertion and kept on replacement.
    pub seq: u64,
    /// `true` if the entry was added by a live create (not the snapshot,
    /// not an update promoting it) and has not been acknowledged yet.
    pub fresh: bool,
}

#[derive(Debug, Clone)]
struct Tombstones {
    capacity: usize,
    order: VecDeque<String>,
    ids: BTreeSet<String>,
}

impl Default for Tombstones {
    fn default() -> Self {
        Self::with_capacity(TOMBSTONE_CAPACITY)
    }
}

impl Tombstones {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: BTreeSet::new(),
        }
    }

    fn insert(&mut self, id: &str) {
        if self.ids.insert(id.to_string()) {
            self.order.push_back(id.to_string());
            while self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.ids.remove(&oldest);
                }
            }
        }
    }

    fn remove(&mut self, id: &str) {
        if self.ids.remove(id) {
            self.order.retain(|t| t != id);
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}

/// The set of active incidents, keyed by ID.
#[derive(Debug, Clone, Default)]
pub struct FeedSet {
    entries: BTreeMap<String, FeedEntry>,
    tombstones: Tombstones,
    next_seq: u64,
}

/// Compares records, arrival order, and tombstones. The newly-arrived flag
/// is presentation state and does not take part.
impl PartialEq for FeedSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.tombstones.ids == other.tombstones.ids
            && self
                .entries()
                .into_iter()
                .zip(other.entries())
                .all(|(a, b)| a.incident == b.incident)
    }
}

impl FeedSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty set remembering at most `capacity` deleted IDs (at least
    /// one). [`TOMBSTONE_CAPACITY`] is the default.
    #[must_use]
    pub fn with_tombstone_capacity(capacity: usize) -> Self {
        Self {
            tombstones: Tombstones::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Builds a set from a snapshot. See [`Self::replace_snapshot`].
    #[must_use]
    pub fn from_snapshot(incidents: impl IntoIterator<Item = Incident>) -> Self {
        let mut set = Self::new();
        set.replace_snapshot(incidents);
        set
    }

    /// Replaces the whole set with `incidents`, in the given order.
    ///
    /// Terminal records are skipped and duplicate IDs keep the first
    /// occurrence. Tombstones are cleared: the snapshot is authoritative.
    pub fn replace_snapshot(&mut self, incidents: impl IntoIterator<Item = Incident>) {
        self.entries.clear();
        self.tombstones.clear();
        for incident in incidents {
            if incident.status.is_terminal() {
                log::debug!("Snapshot carried terminal case {}, skipping", incident.id);
                continue;
            }
            if self.entries.contains_key(&incident.id) {
                log::warn!("Snapshot carried case {} twice, keeping first", incident.id);
                continue;
            }
            self.insert(incident, false);
        }
    }

    /// Number of incidents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `id` is in the set.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Looks up an incident.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Incident> {
        self.entries.get(id).map(|e| &e.incident)
    }

    /// Looks up an entry with its bookkeeping.
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&FeedEntry> {
        self.entries.get(id)
    }

    /// Entries in arrival order.
    #[must_use]
    pub fn entries(&self) -> Vec<&FeedEntry> {
        let mut entries: Vec<&FeedEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    /// Incidents in arrival order.
    pub fn incidents(&self) -> impl Iterator<Item = &Incident> {
        self.entries().into_iter().map(|e| &e.incident)
    }

    /// IDs in arrival order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.entries()
            .into_iter()
            .map(|e| e.incident.id.as_str())
            .collect()
    }

    /// Clears the newly-arrived flag of `id`. Returns `false` if absent.
    pub fn acknowledge(&mut self, id: &str) -> bool {
        self.entries.get_mut(id).is_some_and(|e| {
            e.fresh = false;
            true
        })
    }

    /// Decodes and applies a raw store event. Undecodable records are
    /// dropped as malformed.
    pub fn apply_record_event(&mut self, event: &RecordEvent) -> Transition {
        match FeedEvent::decode(event) {
            Ok(event) => self.apply(&event),
            Err(e) => {
                let id = event
                    .record
                    .get("id")
                    .and_then(serde_json::Value::as_str)
                    .map(String::from);
                log::warn!("Dropping undecodable {} event for {id:?}: {e}", event.action);
                Transition::Ignored {
                    id,
                    reason: IgnoreReason::Malformed,
                }
            }
        }
    }

    /// Applies one event.
    pub fn apply(&mut self, event: &FeedEvent) -> Transition {
        let Some(id) = event.record.id.clone() else {
            log::warn!("Dropping {} event without an id", event.action);
            return ignored(None, IgnoreReason::Malformed);
        };

        let transition = match event.action {
            RecordAction::Delete => self.apply_delete(id),
            RecordAction::Create | RecordAction::Update if event.record.status.is_none() => {
                log::warn!("Dropping {} event for {id} without a status", event.action);
                ignored(Some(id), IgnoreReason::Malformed)
            }
            RecordAction::Create => self.apply_create(id, &event.record),
            RecordAction::Update => self.apply_update(id, &event.record),
        };

        log::trace!("{} -> {transition:?}", event.action);
        transition
    }

    fn apply_create(&mut self, id: String, patch: &IncidentPatch) -> Transition {
        if self.is_stale(&id, patch) {
            return ignored(Some(id), IgnoreReason::Stale);
        }
        self.tombstones.remove(&id);

        let Some(incident) = Incident::from_patch(patch) else {
            return ignored(Some(id), IgnoreReason::Malformed);
        };
        if incident.status.is_terminal() {
            return self.remove_or_ignore(id);
        }

        let cue = Some(Cue::for_category(incident.category()));
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.incident = incident;
            Transition::Replaced { id, cue }
        } else {
            self.insert(incident, true);
            Transition::Inserted { id, cue }
        }
    }

    fn apply_update(&mut self, id: String, patch: &IncidentPatch) -> Transition {
        if self.tombstones.contains(&id) {
            log::debug!("Ignoring update for deleted case {id}");
            return ignored(Some(id), IgnoreReason::Deleted);
        }
        if self.is_stale(&id, patch) {
            return ignored(Some(id), IgnoreReason::Stale);
        }
        if patch.status.as_ref().is_some_and(|s| s.is_terminal()) {
            return self.remove_or_ignore(id);
        }

        if let Some(entry) = self.entries.get_mut(&id) {
            entry.incident.merge(patch);
            return Transition::Replaced { id, cue: None };
        }

        match Incident::from_patch(patch) {
            Some(incident) => {
                self.insert(incident, false);
                Transition::Inserted { id, cue: None }
            }
            None => ignored(Some(id), IgnoreReason::Malformed),
        }
    }

    fn apply_delete(&mut self, id: String) -> Transition {
        self.tombstones.insert(&id);
        if self.entries.remove(&id).is_some() {
            Transition::Removed { id }
        } else {
            ignored(Some(id), IgnoreReason::Absent)
        }
    }

    fn remove_or_ignore(&mut self, id: String) -> Transition {
        if self.entries.remove(&id).is_some() {
            Transition::Removed { id }
        } else {
            ignored(Some(id), IgnoreReason::NotVisible)
        }
    }

    fn is_stale(&self, id: &str, patch: &IncidentPatch) -> bool {
        match (self.entries.get(id).and_then(|e| e.incident.updated), patch.updated) {
            (Some(held), Some(incoming)) => incoming < held,
            _ => false,
        }
    }

    fn insert(&mut self, incident: Incident, fresh: bool) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            incident.id.clone(),
            FeedEntry {
                incident,
                seq,
                fresh,
            },
        );
    }
}

const fn ignored(id: Option<String>, reason: IgnoreReason) -> Transition {
    Transition::Ignored { id, reason }
}

/// Applies `event` to `set`, returning the new set and what happened.
#[must_use]
pub fn apply_event(mut set: FeedSet, event: &FeedEvent) -> (FeedSet, Transition) {
    let transition = set.apply(event);
    (set, transition)
}

#[cfg(test)]
mod tests {
    use patrol_desk_case_models::CaseStatus;
    use patrol_desk_case_models::timestamp;

    use super::*;

    fn incident(id: &str, title: &str, status: CaseStatus) -> Incident {
        Incident::new(id, title, status)
    }

    fn patch(id: &str, status: &str) -> IncidentPatch {
        IncidentPatch {
            id: Some(id.to_string()),
            status: Some(status.into()),
            ..IncidentPatch::default()
        }
    }

    #[test]
    fn dispatch_scenario() {
        let mut set = FeedSet::from_snapshot([incident("1", "Accident on Main St", CaseStatus::Open)]);

        let t = set.apply(&FeedEvent::create(incident("2", "SOS Alert", CaseStatus::Open)));
        assert_eq!(
            t,
            Transition::Inserted {
                id: "2".to_string(),
                cue: Some(Cue::Siren)
            }
        );
        assert_eq!(set.ids(), vec!["1", "2"]);

        let t = set.apply(&FeedEvent::update(patch("1", "Resolved")));
        assert_eq!(t, Transition::Removed { id: "1".to_string() });
        assert_eq!(set.ids(), vec!["2"]);

        let t = set.apply(&FeedEvent::delete("2"));
        assert_eq!(t, Transition::Removed { id: "2".to_string() });
        assert!(set.is_empty());
    }

    #[test]
    fn non_sos_create_gets_notification() {
        let mut set = FeedSet::new();
        let t = set.apply(&FeedEvent::create(incident("9", "Robbery at market", CaseStatus::Open)));
        assert_eq!(t.cue(), Some(Cue::Notification));
        assert!(set.entry("9").unwrap().fresh);
    }

    #[test]
    fn terminal_records_never_enter() {
        let mut set = FeedSet::from_snapshot([
            incident("1", "a", CaseStatus::Open),
            incident("2", "b", CaseStatus::Cancelled),
        ]);
        assert_eq!(set.ids(), vec!["1"]);

        let t = set.apply(&FeedEvent::create(incident("3", "c", CaseStatus::Resolved)));
        assert_eq!(t.cue(), None);
        assert!(!set.contains("3"));

        let t = set.apply(&FeedEvent::update(patch("4", "Cancelled")));
        assert!(matches!(
            t,
            Transition::Ignored {
                reason: IgnoreReason::NotVisible,
                ..
            }
        ));

        set.apply(&FeedEvent::create(incident("1", "a", CaseStatus::Cancelled)));
        assert!(set.is_empty());
    }

    #[test]
    fn update_promotes_into_visibility() {
        let mut set = FeedSet::new();
        let mut reopened = patch("5", "Open");
        reopened.title = Some("Traffic lights out".to_string());
        let t = set.apply(&FeedEvent::update(reopened));
        assert_eq!(
            t,
            Transition::Inserted {
                id: "5".to_string(),
                cue: None
            }
        );
        assert_eq!(set.get("5").unwrap().title, "Traffic lights out");
        assert!(!set.entry("5").unwrap().fresh);
    }

    #[test]
    fn update_merges_over_existing_fields() {
        let mut base = incident("1", "Accident", CaseStatus::Open);
        base.address = Some("Main St".to_string());
        let mut set = FeedSet::from_snapshot([base]);

        let mut change = patch("1", "Ongoing");
        change.notes = Some("tow on the way".to_string());
        set.apply(&FeedEvent::update(change));

        let held = set.get("1").unwrap();
        assert_eq!(held.status, CaseStatus::Ongoing);
        assert_eq!(held.address.as_deref(), Some("Main St"));
        assert_eq!(held.notes.as_deref(), Some("tow on the way"));
    }

    #[test]
    fn same_update_twice_equals_once() {
        let start = FeedSet::from_snapshot([incident("1", "Accident", CaseStatus::Open)]);
        let update = FeedEvent::update(patch("1", "Ongoing"));

        let (once, _) = apply_event(start.clone(), &update);
        let (twice, _) = apply_event(once.clone(), &update);
        assert_eq!(once, twice);

        let (promoted_once, _) = apply_event(FeedSet::new(), &update);
        let (promoted_twice, _) = apply_event(promoted_once.clone(), &update);
        assert_eq!(promoted_once, promoted_twice);
    }

    #[test]
    fn delete_is_absorbing() {
        let mut set = FeedSet::from_snapshot([incident("1", "Accident", CaseStatus::Open)]);
        set.apply(&FeedEvent::delete("1"));

        let t = set.apply(&FeedEvent::update(patch("1", "Open")));
        assert!(matches!(
            t,
            Transition::Ignored {
                reason: IgnoreReason::Deleted,
                ..
            }
        ));
        assert!(!set.contains("1"));

        set.apply(&FeedEvent::create(incident("1", "Accident", CaseStatus::Open)));
        assert!(set.contains("1"));

        set.apply(&FeedEvent::delete("1"));
        set.replace_snapshot([incident("1", "Accident", CaseStatus::Open)]);
        set.apply(&FeedEvent::update(patch("1", "Ongoing")));
        assert_eq!(set.get("1").unwrap().status, CaseStatus::Ongoing);
    }

    #[test]
    fn oldest_tombstones_are_forgotten_first() {
        let mut set = FeedSet::with_tombstone_capacity(2);
        for id in ["a", "b", "c"] {
            set.apply(&FeedEvent::delete(id));
        }

        let t = set.apply(&FeedEvent::update(patch("a", "Open")));
        assert_eq!(
            t,
            Transition::Inserted {
                id: "a".to_string(),
                cue: None
            }
        );
        for id in ["b", "c"] {
            let t = set.apply(&FeedEvent::update(patch(id, "Open")));
            assert!(matches!(
                t,
                Transition::Ignored {
                    reason: IgnoreReason::Deleted,
                    ..
                }
            ));
        }
        assert_eq!(set.ids(), vec!["a"]);
    }

    #[test]
    fn deleting_a_tombstoned_id_again_keeps_its_place() {
        let mut set = FeedSet::with_tombstone_capacity(2);
        set.apply(&FeedEvent::delete("a"));
        set.apply(&FeedEvent::delete("b"));
        set.apply(&FeedEvent::delete("a"));
        set.apply(&FeedEvent::delete("c"));

        assert!(set.apply(&FeedEvent::update(patch("a", "Open"))).changed());
        assert!(!set.apply(&FeedEvent::update(patch("b", "Open"))).changed());
    }

    #[test]
    fn delete_of_absent_id_is_noop() {
        let set = FeedSet::from_snapshot([incident("1", "a", CaseStatus::Open)]);
        let (after, t) = apply_event(set.clone(), &FeedEvent::delete("nope"));
        assert!(!t.changed());
        assert_eq!(after.ids(), set.ids());
    }

    #[test]
    fn duplicate_create_then_update_equals_update() {
        let held = incident("1", "Accident", CaseStatus::Open);
        let start = FeedSet::from_snapshot([held.clone()]);

        let mut latest = held;
        latest.status = CaseStatus::Ongoing;

        let (via_create, _) = apply_event(start.clone(), &FeedEvent::create(latest.clone()));
        let (via_create, _) = apply_event(via_create, &FeedEvent::update(latest.clone()));
        let (via_update, _) = apply_event(start, &FeedEvent::update(latest));
        assert_eq!(via_create, via_update);

        let empty = FeedSet::new();
        let record = incident("2", "SOS", CaseStatus::Open);
        let (a, _) = apply_event(empty.clone(), &FeedEvent::create(record.clone()));
        let (a, _) = apply_event(a, &FeedEvent::update(record.clone()));
        let (b, _) = apply_event(empty, &FeedEvent::update(record));
        assert_eq!(a, b);
    }

    #[test]
    fn stale_events_lose() {
        let mut newer = incident("1", "Accident", CaseStatus::Ongoing);
        newer.updated = timestamp::parse("2024-05-01 10:00:00.000Z");
        let mut set = FeedSet::from_snapshot([newer]);

        let mut old = patch("1", "Open");
        old.updated = timestamp::parse("2024-05-01 09:00:00.000Z");
        let t = set.apply(&FeedEvent::update(old.clone()));
        assert!(matches!(
            t,
            Transition::Ignored {
                reason: IgnoreReason::Stale,
                ..
            }
        ));
        assert!(set.apply(&FeedEvent::create(old)).cue().is_none());
        assert_eq!(set.get("1").unwrap().status, CaseStatus::Ongoing);
    }

    #[test]
    fn malformed_events_are_dropped() {
        let mut set = FeedSet::from_snapshot([incident("1", "a", CaseStatus::Open)]);
        let before = set.clone();

        let no_id = FeedEvent::create(IncidentPatch {
            status: Some(CaseStatus::Open),
            ..IncidentPatch::default()
        });
        let no_status = FeedEvent::update(IncidentPatch {
            id: Some("1".to_string()),
            ..IncidentPatch::default()
        });
        assert!(!set.apply(&no_id).changed());
        assert!(!set.apply(&no_status).changed());

        let garbage = RecordEvent {
            action: RecordAction::Create,
            record: serde_json::json!("not a record"),
        };
        assert!(!set.apply_record_event(&garbage).changed());
        assert_eq!(set, before);
    }

    #[test]
    fn record_events_decode_partial_payloads() {
        let mut set = FeedSet::from_snapshot([incident("1", "Accident", CaseStatus::Open)]);
        let t = set.apply_record_event(&RecordEvent {
            action: RecordAction::Update,
            record: serde_json::json!({"id": "1", "status": "In Progress"}),
        });
        assert!(t.changed());
        assert!(set.get("1").unwrap().status.is_in_progress());
    }

    #[test]
    fn loosely_typed_optional_fields_do_not_drop_the_event() {
        let mut set = FeedSet::new();
        let t = set.apply_record_event(&RecordEvent {
            action: RecordAction::Create,
            record: serde_json::json!({
                "id": "7",
                "status": "Open",
                "title": "SOS Alert",
                "latitude": "-17.83",
                "longitude": "31.05",
                "phoneNumber": 263_771_234_567_u64,
                "updated": 0,
            }),
        });
        assert_eq!(
            t,
            Transition::Inserted {
                id: "7".to_string(),
                cue: Some(Cue::Siren)
            }
        );
        let held = set.get("7").unwrap();
        assert_eq!(held.latitude, Some(-17.83));
        assert_eq!(held.longitude, Some(31.05));
        assert_eq!(held.phone_number.as_deref(), Some("263771234567"));
        assert!(held.updated.is_none());

        set.apply_record_event(&RecordEvent {
            action: RecordAction::Update,
            record: serde_json::json!({"id": "7", "status": "Ongoing", "latitude": ""}),
        });
        let held = set.get("7").unwrap();
        assert_eq!(held.status, CaseStatus::Ongoing);
        assert_eq!(held.latitude, Some(-17.83));
    }

    #[test]
    fn replacement_keeps_arrival_order() {
        let mut set = FeedSet::from_snapshot([
            incident("1", "a", CaseStatus::Open),
            incident("2", "b", CaseStatus::Open),
        ]);
        set.apply(&FeedEvent::create(incident("1", "a (edited)", CaseStatus::Open)));
        assert_eq!(set.ids(), vec!["1", "2"]);
        assert_eq!(set.get("1").unwrap().title, "a (edited)");
    }

    #[test]
    fn acknowledge_clears_fresh_flag() {
        let mut set = FeedSet::new();
        set.apply(&FeedEvent::create(incident("1", "a", CaseStatus::Open)));
        assert!(set.acknowledge("1"));
        assert!(!set.entry("1").unwrap().fresh);
        assert!(!set.acknowledge("2"));
    }
}
