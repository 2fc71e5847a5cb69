//! Reduction of fetched records to dashboard numbers.

use chrono::{DateTime, Datelike as _, Utc};
use patrol_desk_case_models::resources::{
    PoliceStation, Publication, Timestamped, TrafficViolation,
};
use patrol_desk_case_models::{CaseStatus, Incident};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// Months covered by each trend series.
pub const TREND_MONTHS: u32 = 6;

const RECENT_VIOLATIONS: usize = 3;
const RECENT_CASES: usize = 3;
const RECENT_STATIONS: usize = 2;
const RECENT_PUBLICATIONS: usize = 2;

/// Violation totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViolationCounts {
    /// All violations in the window.
    pub total: u64,
    /// Violations that have been dealt with.
    pub sorted: u64,
}

impl ViolationCounts {
    /// Violations still outstanding.
    #[must_use]
    pub const fn unsorted(&self) -> u64 {
        self.total.saturating_sub(self.sorted)
    }
}

/// Case totals by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseCounts {
    /// All cases in the window.
    pub total: u64,
    /// Cases nobody is attending yet.
    pub open: u64,
    /// Cases being attended.
    pub in_progress: u64,
    /// Closed cases.
    pub resolved: u64,
}

/// Station totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StationCounts {
    /// All stations in the window.
    pub total: u64,
    /// Operating stations.
    pub active: u64,
}

/// One month of a trend series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    /// Period label (`"2024-06"`).
    pub period: String,
    /// Records created that month.
    pub count: u64,
}

/// Monthly trend series, oldest month first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Trends {
    /// Violations per month.
    pub violations: Vec<TrendPoint>,
    /// Cases per month.
    pub cases: Vec<TrendPoint>,
}

/// What kind of record an [`Activity`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// A traffic violation.
    Violation,
    /// A case.
    Case,
    /// A police station.
    Station,
    /// A publication.
    Publication,
}

/// One row of the recent activity list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    /// Record kind.
    pub kind: ActivityKind,
    /// Record ID.
    pub id: String,
    /// Licence number, case title, station name, or headline.
    pub label: String,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// Whether the violation is sorted or the case resolved.
    pub settled: bool,
}

/// Everything the analytics dashboard shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Violation totals.
    pub violations: ViolationCounts,
    /// Case totals.
    pub cases: CaseCounts,
    /// Station totals.
    pub stations: StationCounts,
    /// Publications in the window.
    pub publications: u64,
    /// Monthly trends.
    pub trends: Trends,
    /// Latest records across all collections, newest first.
    pub recent_activity: Vec<Activity>,
}

fn count<T>(items: &[T], pred: impl Fn(&T) -> bool) -> u64 {
    items.iter().filter(|item| pred(*item)).count() as u64
}

/// `(year, month)` `back` months before `(year, month)`.
const fn months_back(year: i32, month: u32, back: u32) -> (i32, u32) {
    #[allow(clippy::cast_possible_wrap)]
    let index = year * 12 + (month as i32 - 1) - back as i32;
    #[allow(clippy::cast_sign_loss)]
    let month = index.rem_euclid(12) as u32 + 1;
    (index.div_euclid(12), month)
}

/// Counts per calendar month for the [`TREND_MONTHS`] months ending with
/// the month of `now`, oldest first. Records without a creation time are
/// not counted.
fn monthly_trend<T: Timestamped>(items: &[T], now: DateTime<Utc>) -> Vec<TrendPoint> {
    (0..TREND_MONTHS)
        .rev()
        .map(|back| {
            let (year, month) = months_back(now.year(), now.month(), back);
            TrendPoint {
                period: format!("{year:04}-{month:02}"),
                count: count(items, |item| {
                    item.created()
                        .is_some_and(|c| c.year() == year && c.month() == month)
                }),
            }
        })
        .collect()
}

fn recent_activity(
    violations: &[TrafficViolation],
    cases: &[Incident],
    stations: &[PoliceStation],
    publications: &[Publication],
) -> Vec<Activity> {
    let mut activity: Vec<Activity> = violations
        .iter()
        .take(RECENT_VIOLATIONS)
        .map(|v| Activity {
            kind: ActivityKind::Violation,
            id: v.id.clone(),
            label: v.licence_number.clone(),
            created: v.created,
            settled: v.is_sorted,
        })
        .chain(cases.iter().take(RECENT_CASES).map(|c| Activity {
            kind: ActivityKind::Case,
            id: c.id.clone(),
            label: c.title.clone(),
            created: c.created,
            settled: c.status == CaseStatus::Resolved,
        }))
        .chain(stations.iter().take(RECENT_STATIONS).map(|s| Activity {
            kind: ActivityKind::Station,
            id: s.id.clone(),
            label: s.station.clone(),
            created: s.created,
            settled: false,
        }))
        .chain(
            publications
                .iter()
                .take(RECENT_PUBLICATIONS)
                .map(|p| Activity {
                    kind: ActivityKind::Publication,
                    id: p.id.clone(),
                    label: p.title.clone(),
                    created: p.created,
                    settled: false,
                }),
        )
        .collect();

    // Stable, so ties keep collection order. Undated records sink.
    activity.sort_by(|a, b| b.created.cmp(&a.created));
    activity
}

/// Reduces already-fetched records to dashboard numbers.
///
/// Each slice is expected newest first; the recent activity list takes
/// the leading records of each.
#[must_use]
pub fn summarize(
    violations: &[TrafficViolation],
    cases: &[Incident],
    stations: &[PoliceStation],
    publications: &[Publication],
    now: DateTime<Utc>,
) -> DashboardStats {
    DashboardStats {
        violations: ViolationCounts {
            total: violations.len() as u64,
            sorted: count(violations, |v| v.is_sorted),
        },
        cases: CaseCounts {
            total: cases.len() as u64,
            open: count(cases, |c| c.status == CaseStatus::Open),
            in_progress: count(cases, |c| c.status.is_in_progress()),
            resolved: count(cases, |c| c.status == CaseStatus::Resolved),
        },
        stations: StationCounts {
            total: stations.len() as u64,
            active: count(stations, |s| s.active),
        },
        publications: publications.len() as u64,
        trends: Trends {
            violations: monthly_trend(violations, now),
            cases: monthly_trend(cases, now),
        },
        recent_activity: recent_activity(violations, cases, stations, publications),
    }
}
