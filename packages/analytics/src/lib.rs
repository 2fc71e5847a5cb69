#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dashboard statistics.
//!
//! [`dashboard_stats`] fetches violations, cases, stations, and
//! publications created inside a [`DateWindow`] and reduces them to the
//! counts, monthly trends, and recent activity the analytics page shows.

pub mod stats;

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use patrol_desk_case_models::Incident;
use patrol_desk_case_models::resources::{PoliceStation, Publication, TrafficViolation};
use patrol_desk_store::{CollectionClient, RecordStore, StoreError};
use patrol_desk_store_models::{Field, Filter, ListOptions, Sort};
use thiserror::Error;

pub use stats::{
    Activity, ActivityKind, CaseCounts, DashboardStats, StationCounts, TREND_MONTHS, TrendPoint,
    Trends, ViolationCounts, summarize,
};

/// Errors that can occur during analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A collection could not be fetched.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which records count towards the dashboard, by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    /// Records created in the last `n` days.
    LastDays(u32),
    /// Everything.
    AllTime,
}

impl Default for DateWindow {
    fn default() -> Self {
        Self::LastDays(7)
    }
}

impl DateWindow {
    /// `--days` style constructor: `None` means all time.
    #[must_use]
    pub const fn from_days(days: Option<u32>) -> Self {
        match days {
            Some(days) => Self::LastDays(days),
            None => Self::AllTime,
        }
    }

    /// Inclusive `(start, end)` bounds ending at `now`.
    #[must_use]
    pub fn bounds(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Self::LastDays(days) => (now - Duration::days(i64::from(days)), now),
            Self::AllTime => (DateTime::UNIX_EPOCH, now),
        }
    }

    /// `created >= start && created <= end`.
    #[must_use]
    pub fn filter(self, now: DateTime<Utc>) -> Filter {
        let (start, end) = self.bounds(now);
        Filter::gte(Field::Created, start).and(Filter::lte(Field::Created, end))
    }
}

/// Error returned when parsing an invalid [`DateWindow`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid date window '{0}': expected a number of days or 'all'")]
pub struct InvalidWindowError(String);

impl FromStr for DateWindow {
    type Err = InvalidWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::AllTime);
        }
        s.parse()
            .map(Self::LastDays)
            .map_err(|_| InvalidWindowError(s.to_string()))
    }
}

/// Fetches every collection inside `window` and summarizes it.
///
/// The four collections are fetched concurrently, each newest first.
///
/// # Errors
///
/// Returns [`AnalyticsError::Store`] if any fetch fails.
pub async fn dashboard_stats(
    store: &dyn RecordStore,
    window: DateWindow,
    now: DateTime<Utc>,
) -> Result<DashboardStats, AnalyticsError> {
    let options = ListOptions::default()
        .filter(Some(window.filter(now)))
        .sort(Sort::desc(Field::Created));

    let violations = CollectionClient::<TrafficViolation>::new(store);
    let cases = CollectionClient::<Incident>::new(store);
    let stations = CollectionClient::<PoliceStation>::new(store);
    let publications = CollectionClient::<Publication>::new(store);

    let (violations, cases, stations, publications) = futures::try_join!(
        violations.list(&options),
        cases.list(&options),
        stations.list(&options),
        publications.list(&options),
    )?;

    log::debug!(
        "Fetched {} violations, {} cases, {} stations, {} publications for {window:?}",
        violations.len(),
        cases.len(),
        stations.len(),
        publications.len()
    );

    Ok(summarize(&violations, &cases, &stations, &publications, now))
}
