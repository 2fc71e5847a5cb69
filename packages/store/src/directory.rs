//! Police station directory, publications, and the suggestion box.

use patrol_desk_case_models::resources::{
    PoliceStation, Publication, StationValidationError, Suggestion, SuggestionFlag,
};
use patrol_desk_store_models::{Field, Filter, ListOptions, Sort};

use crate::{CollectionClient, RecordStore, StoreError};

fn search_term(term: Option<&str>) -> Option<&str> {
    term.map(str::trim).filter(|t| !t.is_empty())
}

/// Filters for the station directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationQuery {
    /// Substring matched against station name, officer in charge, and
    /// station number.
    pub search: Option<String>,
    /// Exact province.
    pub province: Option<String>,
    /// Only operating (`true`) or closed (`false`) stations.
    pub active: Option<bool>,
    /// Exact specialty.
    pub specialty: Option<String>,
    /// Sort order. Defaults to newest first.
    pub sort: Sort,
}

impl Default for StationQuery {
    fn default() -> Self {
        Self {
            search: None,
            province: None,
            active: None,
            specialty: None,
            sort: Sort::desc(Field::Created),
        }
    }
}

impl StationQuery {
    /// Structured filter, or `None` to list every station.
    #[must_use]
    pub fn filter(&self) -> Option<Filter> {
        let search = search_term(self.search.as_deref()).and_then(|term| {
            Filter::search(
                &[Field::Station, Field::MemberInCharge, Field::StationNumber],
                term,
            )
        });
        let province = search_term(self.province.as_deref()).map(|p| Filter::eq(Field::Province, p));
        let active = self.active.map(|a| Filter::eq(Field::Active, a));
        let specialty =
            search_term(self.specialty.as_deref()).map(|s| Filter::eq(Field::Specialty, s));

        Filter::all([search, province, active, specialty].into_iter().flatten())
    }
}

/// Lists stations matching `query`.
///
/// # Errors
///
/// Returns [`StoreError`] if the list request fails.
pub async fn list_stations(
    store: &dyn RecordStore,
    query: &StationQuery,
) -> Result<Vec<PoliceStation>, StoreError> {
    let options = ListOptions::default()
        .filter(query.filter())
        .sort(query.sort);
    CollectionClient::<PoliceStation>::new(store)
        .list(&options)
        .await
}

/// Why a station could not be saved.
#[derive(Debug, thiserror::Error)]
pub enum StationError {
    /// Required fields are blank.
    #[error(transparent)]
    Invalid(#[from] StationValidationError),
    /// The store rejected the record.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validates and creates a station.
///
/// # Errors
///
/// Returns [`StationError::Invalid`] if required fields are blank, or
/// [`StationError::Store`] if the store rejects the record.
pub async fn create_station(
    store: &dyn RecordStore,
    station: &PoliceStation,
) -> Result<PoliceStation, StationError> {
    station.validate()?;
    Ok(CollectionClient::<PoliceStation>::new(store)
        .create(station)
        .await?)
}

/// Validates and saves changes to an existing station.
///
/// # Errors
///
/// Returns [`StationError::Invalid`] if required fields are blank, or
/// [`StationError::Store`] if the station is missing or the update is
/// rejected.
pub async fn update_station(
    store: &dyn RecordStore,
    id: &str,
    station: &PoliceStation,
) -> Result<PoliceStation, StationError> {
    station.validate()?;
    Ok(CollectionClient::<PoliceStation>::new(store)
        .update(id, station)
        .await?)
}

/// Lists publications whose title or author contains `search`, newest
/// first.
///
/// # Errors
///
/// Returns [`StoreError`] if the list request fails.
pub async fn list_publications(
    store: &dyn RecordStore,
    search: Option<&str>,
) -> Result<Vec<Publication>, StoreError> {
    let filter =
        search_term(search).and_then(|term| Filter::search(&[Field::Title, Field::Author], term));
    let options = ListOptions::default()
        .filter(filter)
        .sort(Sort::desc(Field::Created));
    CollectionClient::<Publication>::new(store)
        .list(&options)
        .await
}

/// Lists suggestion box entries, newest first, optionally narrowed to one
/// flag and to comments containing `search`.
///
/// # Errors
///
/// Returns [`StoreError`] if the list request fails.
pub async fn list_suggestions(
    store: &dyn RecordStore,
    flag: Option<SuggestionFlag>,
    search: Option<&str>,
) -> Result<Vec<Suggestion>, StoreError> {
    let filter = Filter::all(
        [
            flag.map(|f| Filter::eq(Field::Flag, f.as_ref())),
            search_term(search).map(|term| Filter::like(Field::Comment, term)),
        ]
        .into_iter()
        .flatten(),
    );
    let options = ListOptions::default()
        .filter(filter)
        .sort(Sort::desc(Field::Created));
    CollectionClient::<Suggestion>::new(store)
        .list(&options)
        .await
}
