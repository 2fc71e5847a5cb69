#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record store collections, structured filters, and realtime event types.
//!
//! Filters are built as data ([`Filter`]) over an enumerated set of
//! [`Field`]s and [`Operator`]s and only turned into the store's filter
//! syntax by [`Filter::render`], which quotes and escapes every text value.
//! Nothing user-supplied is ever spliced into a filter string directly.

pub mod filter;

pub use filter::{Field, Filter, FilterValue, Operator};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default page size used when listing a full collection.
pub const DEFAULT_PER_PAGE: u32 = 200;

/// A collection in the record store.
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
pub enum Collection {
    /// Case records (incidents).
    Cases,
    /// Traffic violations.
    TrafficViolations,
    /// Police station contact cards.
    Contacts,
    /// Publications.
    News,
    /// Suggestion box entries.
    Comments,
    /// Operator accounts.
    Users,
}

impl Collection {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Cases,
            Self::TrafficViolations,
            Self::Contacts,
            Self::News,
            Self::Comments,
            Self::Users,
        ]
    }
}

/// Sort key for list requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    /// Field to sort by.
    pub field: Field,
    /// `true` for newest/highest first.
    pub descending: bool,
}

impl Sort {
    /// Ascending sort on `field`.
    #[must_use]
    pub const fn asc(field: Field) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    /// Descending sort on `field`.
    #[must_use]
    pub const fn desc(field: Field) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    /// Renders as `"created"` / `"-created"`.
    #[must_use]
    pub fn render(&self) -> String {
        if self.descending {
            format!("-{}", self.field.as_ref())
        } else {
            self.field.as_ref().to_string()
        }
    }
}

/// Options for a list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    /// Optional filter.
    pub filter: Option<Filter>,
    /// Sort keys, applied in order.
    pub sort: Vec<Sort>,
    /// Relations to expand (e.g. `"assignedOfficer"`).
    pub expand: Vec<String>,
    /// Page size used while paging through the collection.
    pub per_page: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            filter: None,
            sort: Vec::new(),
            expand: Vec::new(),
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ListOptions {
    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<Option<Filter>>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    /// Appends a relation to expand.
    #[must_use]
    pub fn expand(mut self, relation: impl Into<String>) -> Self {
        self.expand.push(relation.into());
        self
    }

    /// Sets the page size. Zero is bumped to one.
    #[must_use]
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Query parameters for a single page request.
    #[must_use]
    pub fn to_query(&self, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", page.to_string()),
            ("perPage", self.per_page.to_string()),
            ("skipTotal", "1".to_string()),
        ];
        if let Some(filter) = &self.filter {
            let rendered = filter.render();
            if !rendered.is_empty() {
                params.push(("filter", rendered));
            }
        }
        if !self.sort.is_empty() {
            let sort: Vec<String> = self.sort.iter().map(Sort::render).collect();
            params.push(("sort", sort.join(",")));
        }
        if !self.expand.is_empty() {
            params.push(("expand", self.expand.join(",")));
        }
        params
    }
}

/// Kind of change carried by a realtime event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordAction {
    /// A record was created.
    Create,
    /// A record was updated.
    Update,
    /// A record was deleted.
    Delete,
}

/// A realtime change notification, record left as raw JSON.
///
/// Decoding the record into a model type is the consumer's job so that a
/// malformed record can be dropped without failing the whole stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEvent {
    /// What happened.
    pub action: RecordAction,
    /// The record after the change (before it, for deletes).
    pub record: serde_json::Value,
}

/// What a subscription listens to within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every record in the collection.
    All,
    /// A single record.
    Record(String),
}

impl Topic {
    /// Subscription key, e.g. `"cases/*"`.
    #[must_use]
    pub fn key(&self, collection: Collection) -> String {
        match self {
            Self::All => format!("{collection}/*"),
            Self::Record(id) => format!("{collection}/{id}"),
        }
    }
}
