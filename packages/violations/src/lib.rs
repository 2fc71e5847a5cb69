#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Traffic violation listing, quick edits, and CSV bulk import.

pub mod import;
pub mod progress;

use patrol_desk_case_models::resources::{NewTrafficViolation, TrafficViolation};
use patrol_desk_store::{CollectionClient, RecordStore, StoreError};
use patrol_desk_store_models::{Field, Filter, ListOptions, Sort};
use strum_macros::{AsRefStr, Display, EnumString};

pub use import::{
    CsvPreview, ImportError, ImportSummary, PREVIEW_ROWS, ParsedCsv, import, parse_file, parse_rows,
    preview,
};
pub use progress::{LogProgress, NullProgress, ProgressCallback};

/// Which violations to show by sorted state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortedFilter {
    /// Every violation.
    #[default]
    All,
    /// Only violations that have been dealt with.
    Sorted,
    /// Only violations still outstanding.
    Unsorted,
}

impl SortedFilter {
    /// Required `isSorted` value, or `None` for [`Self::All`].
    #[must_use]
    pub const fn is_sorted(self) -> Option<bool> {
        match self {
            Self::All => None,
            Self::Sorted => Some(true),
            Self::Unsorted => Some(false),
        }
    }
}

/// Filters for the violations table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationQuery {
    /// Substring of the licence number.
    pub search: Option<String>,
    /// Sorted-state filter.
    pub sorted: SortedFilter,
}

impl ViolationQuery {
    /// Structured filter, or `None` to list everything.
    #[must_use]
    pub fn filter(&self) -> Option<Filter> {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|term| Filter::like(Field::LicenceNumber, term));
        let sorted = self
            .sorted
            .is_sorted()
            .map(|value| Filter::eq(Field::IsSorted, value));

        Filter::all([search, sorted].into_iter().flatten())
    }

    /// List options: [`Self::filter`], newest first.
    #[must_use]
    pub fn list_options(&self) -> ListOptions {
        ListOptions::default()
            .filter(self.filter())
            .sort(Sort::desc(Field::Created))
    }
}

/// Lists violations matching `query`, newest first.
///
/// # Errors
///
/// Returns [`StoreError`] if the list request fails.
pub async fn list_violations(
    store: &dyn RecordStore,
    query: &ViolationQuery,
) -> Result<Vec<TrafficViolation>, StoreError> {
    CollectionClient::<TrafficViolation>::new(store)
        .list(&query.list_options())
        .await
}

/// Records a single violation.
///
/// # Errors
///
/// Returns [`StoreError`] if the store rejects the record.
pub async fn create_violation(
    store: &dyn RecordStore,
    violation: &NewTrafficViolation,
) -> Result<TrafficViolation, StoreError> {
    CollectionClient::<TrafficViolation>::new(store)
        .create(violation)
        .await
}

/// Flips the sorted flag on `violation` and returns the stored result.
///
/// # Errors
///
/// Returns [`StoreError`] if the violation no longer exists or the update
/// is rejected.
pub async fn toggle_sorted(
    store: &dyn RecordStore,
    violation: &TrafficViolation,
) -> Result<TrafficViolation, StoreError> {
    log::debug!(
        "Marking violation {} as {}",
        violation.id,
        if violation.is_sorted { "unsorted" } else { "sorted" }
    );
    CollectionClient::<TrafficViolation>::new(store)
        .update(
            &violation.id,
            &serde_json::json!({ "isSorted": !violation.is_sorted }),
        )
        .await
}

/// Deletes a violation.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if it is already gone.
pub async fn delete_violation(store: &dyn RecordStore, id: &str) -> Result<(), StoreError> {
    CollectionClient::<TrafficViolation>::new(store)
        .delete(id)
        .await
}

#[cfg(test)]
mod tests {
    use patrol_desk_store::memory::MemoryStore;
    use patrol_desk_store_models::Collection;

    use super::*;

    #[test]
    fn filter_renders_search_and_state() {
        let query = ViolationQuery {
            search: Some("ABC".to_string()),
            sorted: SortedFilter::Unsorted,
        };
        assert_eq!(
            query.filter().unwrap().render(),
            r#"licence_number ~ "ABC" && isSorted = false"#
        );

        let blank = ViolationQuery {
            search: Some("  ".to_string()),
            sorted: SortedFilter::All,
        };
        assert!(blank.filter().is_none());
    }

    #[test]
    fn sorted_filter_parses_case_insensitively() {
        assert_eq!("Sorted".parse::<SortedFilter>().unwrap(), SortedFilter::Sorted);
        assert_eq!("unsorted".parse::<SortedFilter>().unwrap(), SortedFilter::Unsorted);
        assert!("maybe".parse::<SortedFilter>().is_err());
    }

    #[tokio::test]
    async fn toggle_then_filter() {
        let store = MemoryStore::new();
        let first = create_violation(
            &store,
            &NewTrafficViolation {
                licence_number: "AAB 1234".to_string(),
                is_sorted: false,
            },
        )
        .await
        .unwrap();
        create_violation(
            &store,
            &NewTrafficViolation {
                licence_number: "ACD 9876".to_string(),
                is_sorted: false,
            },
        )
        .await
        .unwrap();

        let toggled = toggle_sorted(&store, &first).await.unwrap();
        assert!(toggled.is_sorted);

        let sorted = list_violations(
            &store,
            &ViolationQuery {
                sorted: SortedFilter::Sorted,
                ..ViolationQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].licence_number, "AAB 1234");

        let by_plate = list_violations(
            &store,
            &ViolationQuery {
                search: Some("acd".to_string()),
                ..ViolationQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_plate.len(), 1);

        delete_violation(&store, &first.id).await.unwrap();
        assert_eq!(store.records(Collection::TrafficViolations).len(), 1);
        assert!(matches!(
            delete_violation(&store, &first.id).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
