//! Data-only map presentation over a [`FeedSet`].

use patrol_desk_case_models::{Coordinates, Incident, MarkerCategory};

use crate::reducer::FeedSet;

/// Map center before any incident has been placed (Harare CBD).
pub const DEFAULT_CENTER: Coordinates = Coordinates::new(-17.825_165, 31.053_028);

/// Zoom level used for the default view.
pub const DEFAULT_ZOOM: u8 = 14;

/// One pin on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Incident ID.
    pub id: String,
    /// Incident title.
    pub title: String,
    /// Where to draw the pin.
    pub coordinates: Coordinates,
    /// Icon category.
    pub category: MarkerCategory,
    /// Whether the pin pulses (SOS).
    pub pulse: bool,
    /// Whether the incident was created live and has not been acknowledged.
    pub fresh: bool,
}

/// Google Maps directions URL to `destination`.
#[must_use]
pub fn directions_url(destination: Coordinates) -> String {
    format!(
        "https://www.google.com/maps/dir/?api=1&destination={},{}",
        destination.latitude, destination.longitude
    )
}

/// Map state: the latest feed set, the selected incident, and where the
/// map is centred.
#[derive(Debug, Clone)]
pub struct MapView {
    set: FeedSet,
    selected: Option<String>,
    center: Coordinates,
    newest_seq: Option<u64>,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            set: FeedSet::new(),
            selected: None,
            center: DEFAULT_CENTER,
            newest_seq: None,
        }
    }
}

impl MapView {
    /// An empty map centred on [`DEFAULT_CENTER`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes in the latest published set.
    ///
    /// Clears the selection if the selected incident left the set, and
    /// recentres on the newest live-created incident that has coordinates.
    pub fn sync(&mut self, set: &FeedSet) {
        self.set = set.clone();

        if let Some(id) = &self.selected
            && !self.set.contains(id)
        {
            log::debug!("Selected incident {id} left the feed");
            self.selected = None;
        }

        let newest = self
            .set
            .entries()
            .into_iter()
            .filter(|e| e.fresh && self.newest_seq.is_none_or(|seen| e.seq > seen))
            .filter_map(|e| Some((e.seq, e.incident.coordinates()?)))
            .max_by_key(|(seq, _)| *seq);
        if let Some((seq, coordinates)) = newest {
            self.center = coordinates;
            self.newest_seq = Some(seq);
        }
    }

    /// The set currently shown.
    #[must_use]
    pub const fn set(&self) -> &FeedSet {
        &self.set
    }

    /// Pins for every incident with coordinates, in arrival order.
    #[must_use]
    pub fn markers(&self) -> Vec<Marker> {
        self.set
            .entries()
            .into_iter()
            .filter_map(|entry| {
                let incident = &entry.incident;
                let category = incident.category();
                Some(Marker {
                    id: incident.id.clone(),
                    title: incident.title.clone(),
                    coordinates: incident.coordinates()?,
                    category,
                    pulse: category.pulses(),
                    fresh: entry.fresh,
                })
            })
            .collect()
    }

    /// Incidents that cannot be placed for lack of coordinates.
    #[must_use]
    pub fn unplaced(&self) -> Vec<&Incident> {
        self.set
            .incidents()
            .filter(|i| i.coordinates().is_none())
            .collect()
    }

    /// Selects `id`. Returns `false` (and leaves the selection alone) if it
    /// is not in the set.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.set.contains(id) {
            return false;
        }
        self.selected = Some(id.to_string());
        true
    }

    /// Clears the selection.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// The selected incident.
    #[must_use]
    pub fn selected(&self) -> Option<&Incident> {
        self.selected.as_deref().and_then(|id| self.set.get(id))
    }

    /// Where the map is centred.
    #[must_use]
    pub const fn center(&self) -> Coordinates {
        self.center
    }

    /// Directions to the selected incident.
    #[must_use]
    pub fn directions(&self) -> Option<String> {
        self.selected()
            .and_then(Incident::coordinates)
            .map(directions_url)
    }
}

#[cfg(test)]
mod tests {
    use patrol_desk_case_models::CaseStatus;

    use super::*;
    use crate::reducer::FeedEvent;

    fn placed(id: &str, title: &str, lat: f64, lng: f64) -> Incident {
        let mut incident = Incident::new(id, title, CaseStatus::Open);
        incident.latitude = Some(lat);
        incident.longitude = Some(lng);
        incident
    }

    #[test]
    fn markers_carry_category_and_pulse() {
        let mut set = FeedSet::from_snapshot([
            placed("1", "Accident on Main St", -17.83, 31.05),
            Incident::new("2", "No location", CaseStatus::Open),
        ]);
        set.apply(&FeedEvent::create(placed("3", "SOS Alert", -17.82, 31.04)));

        let mut map = MapView::new();
        map.sync(&set);
        let markers = map.markers();

        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].category, MarkerCategory::Collision);
        assert!(!markers[0].pulse);
        assert!(!markers[0].fresh);
        assert_eq!(markers[1].category, MarkerCategory::Sos);
        assert!(markers[1].pulse);
        assert!(markers[1].fresh);
        assert_eq!(map.unplaced().len(), 1);
    }

    #[test]
    fn recentres_on_newest_live_incident_only() {
        let mut set = FeedSet::from_snapshot([placed("1", "Accident", -17.9, 31.1)]);
        let mut map = MapView::new();
        map.sync(&set);
        assert_eq!(map.center(), DEFAULT_CENTER);

        set.apply(&FeedEvent::create(placed("2", "Robbery", -17.7, 30.9)));
        map.sync(&set);
        assert_eq!(map.center(), Coordinates::new(-17.7, 30.9));

        set.apply(&FeedEvent::update(placed("1", "Accident", -18.0, 31.2)));
        map.sync(&set);
        assert_eq!(map.center(), Coordinates::new(-17.7, 30.9));
    }

    #[test]
    fn promoted_incident_does_not_move_the_map() {
        let mut set = FeedSet::new();
        let mut map = MapView::new();

        set.apply(&FeedEvent::update(placed("4", "Reopened robbery", -17.7, 30.9)));
        map.sync(&set);
        assert_eq!(map.center(), DEFAULT_CENTER);
        assert!(!map.markers()[0].fresh);

        set.apply(&FeedEvent::create(placed("5", "Accident", -17.9, 31.1)));
        map.sync(&set);
        assert_eq!(map.center(), Coordinates::new(-17.9, 31.1));
    }

    #[test]
    fn selection_clears_when_incident_leaves() {
        let mut set = FeedSet::from_snapshot([placed("1", "Accident", -17.83, 31.05)]);
        let mut map = MapView::new();
        map.sync(&set);

        assert!(!map.select("missing"));
        assert!(map.select("1"));
        assert_eq!(
            map.directions().as_deref(),
            Some("https://www.google.com/maps/dir/?api=1&destination=-17.83,31.05")
        );

        set.apply(&FeedEvent::update(Incident::new("1", "Accident", CaseStatus::Resolved)));
        map.sync(&set);
        assert!(map.selected().is_none());
        assert!(map.directions().is_none());
    }
}
