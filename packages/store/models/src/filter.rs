//! Structured filter expressions for list requests.
//!
//! Renders to the store's filter grammar: `field op value` conditions
//! joined by `&&` / `||`, with parentheses around nested groups. Text and
//! timestamp values are always double-quoted with `\` and `"` escaped.

use chrono::{DateTime, Utc};
use patrol_desk_case_models::{CaseStatus, timestamp};
use strum_macros::{AsRefStr, Display, EnumString};

/// A filterable or sortable field.
///
/// Names follow the store schema, which is not consistently cased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr)]
pub enum Field {
    /// Record ID.
    #[strum(serialize = "id")]
    Id,
    /// Creation time.
    #[strum(serialize = "created")]
    Created,
    /// Last modification time.
    #[strum(serialize = "updated")]
    Updated,
    /// Case or publication title.
    #[strum(serialize = "title")]
    Title,
    /// Case or publication description.
    #[strum(serialize = "description")]
    Description,
    /// Case address.
    #[strum(serialize = "address")]
    Address,
    /// Case status.
    #[strum(serialize = "status")]
    Status,
    /// Case priority.
    #[strum(serialize = "priority")]
    Priority,
    /// Violation licence number.
    #[strum(serialize = "licence_number")]
    LicenceNumber,
    /// Violation sorted flag.
    #[strum(serialize = "isSorted")]
    IsSorted,
    /// Station name.
    #[strum(serialize = "station")]
    Station,
    /// Station province.
    #[strum(serialize = "province")]
    Province,
    /// Station specialty.
    #[strum(serialize = "specialty")]
    Specialty,
    /// Station officer in charge.
    #[strum(serialize = "member_in_charge")]
    MemberInCharge,
    /// Station landline.
    #[strum(serialize = "station_number")]
    StationNumber,
    /// Station active flag.
    #[strum(serialize = "active")]
    Active,
    /// Publication author.
    #[strum(serialize = "author")]
    Author,
    /// Suggestion text.
    #[strum(serialize = "comment")]
    Comment,
    /// Suggestion flag.
    #[strum(serialize = "flag")]
    Flag,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum Operator {
    /// Equal.
    #[strum(serialize = "=")]
    Eq,
    /// Not equal.
    #[strum(serialize = "!=")]
    Ne,
    /// Contains (case-insensitive, wildcard-wrapped by the store).
    #[strum(serialize = "~")]
    Like,
    /// Does not contain.
    #[strum(serialize = "!~")]
    NotLike,
    /// Greater than.
    #[strum(serialize = ">")]
    Gt,
    /// Greater than or equal.
    #[strum(serialize = ">=")]
    Gte,
    /// Less than.
    #[strum(serialize = "<")]
    Lt,
    /// Less than or equal.
    #[strum(serialize = "<=")]
    Lte,
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Quoted text.
    Text(String),
    /// Bare `true` / `false`.
    Bool(bool),
    /// Bare number.
    Number(f64),
    /// Quoted timestamp in store format.
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    fn render(&self) -> String {
        match self {
            Self::Text(text) => quote(text),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Timestamp(dt) => quote(&timestamp::format(dt)),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for FilterValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<CaseStatus> for FilterValue {
    fn from(value: CaseStatus) -> Self {
        Self::Text(value.into())
    }
}

impl From<&CaseStatus> for FilterValue {
    fn from(value: &CaseStatus) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field op value`.
    Condition {
        /// Left-hand field.
        field: Field,
        /// Operator.
        op: Operator,
        /// Right-hand value.
        value: FilterValue,
    },
    /// All children must match.
    And(Vec<Filter>),
    /// Any child must match.
    Or(Vec<Filter>),
}

impl Filter {
    /// Builds a single condition.
    #[must_use]
    pub fn condition(field: Field, op: Operator, value: impl Into<FilterValue>) -> Self {
        Self::Condition {
            field,
            op,
            value: value.into(),
        }
    }

    /// `field = value`.
    #[must_use]
    pub fn eq(field: Field, value: impl Into<FilterValue>) -> Self {
        Self::condition(field, Operator::Eq, value)
    }

    /// `field != value`.
    #[must_use]
    pub fn ne(field: Field, value: impl Into<FilterValue>) -> Self {
        Self::condition(field, Operator::Ne, value)
    }

    /// `field ~ value` (contains).
    #[must_use]
    pub fn like(field: Field, value: impl Into<FilterValue>) -> Self {
        Self::condition(field, Operator::Like, value)
    }

    /// `field >= value`.
    #[must_use]
    pub fn gte(field: Field, value: impl Into<FilterValue>) -> Self {
        Self::condition(field, Operator::Gte, value)
    }

    /// `field <= value`.
    #[must_use]
    pub fn lte(field: Field, value: impl Into<FilterValue>) -> Self {
        Self::condition(field, Operator::Lte, value)
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let mut children = match self {
            Self::And(children) => children,
            single => vec![single],
        };
        match other {
            Self::And(more) => children.extend(more),
            single => children.push(single),
        }
        Self::And(children)
    }

    /// Disjunction of `self` and `other`, flattening nested `Or`s.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let mut children = match self {
            Self::Or(children) => children,
            single => vec![single],
        };
        match other {
            Self::Or(more) => children.extend(more),
            single => children.push(single),
        }
        Self::Or(children)
    }

    /// Conjunction of every filter yielded. `None` when there are none.
    pub fn all(filters: impl IntoIterator<Item = Self>) -> Option<Self> {
        filters.into_iter().reduce(Self::and)
    }

    /// Disjunction of every filter yielded. `None` when there are none.
    pub fn any(filters: impl IntoIterator<Item = Self>) -> Option<Self> {
        filters.into_iter().reduce(Self::or)
    }

    /// `field ~ term` across several fields, OR-ed together.
    #[must_use]
    pub fn search(fields: &[Field], term: &str) -> Option<Self> {
        Self::any(fields.iter().map(|field| Self::like(*field, term)))
    }

    /// Renders the filter in store syntax.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Condition { field, op, value } => {
                format!("{} {} {}", field.as_ref(), op.as_ref(), value.render())
            }
            Self::And(children) => render_group(children, " && "),
            Self::Or(children) => render_group(children, " || "),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

fn render_group(children: &[Filter], separator: &str) -> String {
    let parts: Vec<String> = children
        .iter()
        .map(|child| match child {
            Filter::Condition { .. } => child.render(),
            Filter::And(inner) | Filter::Or(inner) if inner.len() == 1 => child.render(),
            Filter::And(inner) | Filter::Or(inner) if inner.is_empty() => String::new(),
            Filter::And(_) | Filter::Or(_) => format!("({})", child.render()),
        })
        .filter(|part| !part.is_empty())
        .collect();
    parts.join(separator)
}

/// Double-quotes `text`, escaping backslashes and quotes.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_cases_filter() {
        let filter = Filter::ne(Field::Status, CaseStatus::Resolved)
            .and(Filter::ne(Field::Status, CaseStatus::Cancelled));
        assert_eq!(
            filter.render(),
            "status != \"Resolved\" && status != \"Cancelled\""
        );
    }

    #[test]
    fn search_group_is_parenthesized() {
        let search = Filter::search(&[Field::Title, Field::Description, Field::Address], "main")
            .unwrap();
        let filter = search.and(Filter::eq(Field::Status, "Open"));
        assert_eq!(
            filter.render(),
            "(title ~ \"main\" || description ~ \"main\" || address ~ \"main\") && status = \"Open\""
        );
    }

    #[test]
    fn quotes_are_escaped() {
        let filter = Filter::like(Field::LicenceNumber, "x\" || id != \"");
        assert_eq!(
            filter.render(),
            "licence_number ~ \"x\\\" || id != \\\"\""
        );
    }

    #[test]
    fn bool_and_timestamp_values() {
        assert_eq!(
            Filter::eq(Field::IsSorted, true).render(),
            "isSorted = true"
        );
        let dt = timestamp::parse("2024-05-01 00:00:00.000Z").unwrap();
        assert_eq!(
            Filter::gte(Field::Created, dt).render(),
            "created >= \"2024-05-01 00:00:00.000Z\""
        );
    }

    #[test]
    fn all_of_nothing_is_none() {
        assert!(Filter::all(Vec::new()).is_none());
        assert!(Filter::search(&[], "x").is_none());
    }

    #[test]
    fn single_child_groups_render_bare() {
        let filter = Filter::And(vec![Filter::Or(vec![Filter::eq(Field::Id, "1")])]);
        assert_eq!(filter.render(), "id = \"1\"");
    }
}
