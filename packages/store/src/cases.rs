//! Case listing and the "attend" workflow.

use patrol_desk_case_models::{CaseStatus, Incident, IncidentPatch};
use patrol_desk_store_models::{Field, Filter, ListOptions, Sort};

use crate::{CollectionClient, RecordStore, StoreError};

/// Text fields searched by [`CaseQuery::search`].
pub const SEARCH_FIELDS: &[Field] = &[Field::Title, Field::Description, Field::Address];

/// Filter for the live map snapshot: every case that is neither resolved
/// nor cancelled.
#[must_use]
pub fn active_filter() -> Filter {
    Filter::ne(Field::Status, CaseStatus::Resolved)
        .and(Filter::ne(Field::Status, CaseStatus::Cancelled))
}

/// Fetches every active case, newest first.
///
/// # Errors
///
/// Returns [`StoreError`] if the list request fails.
pub async fn list_active_cases(store: &dyn RecordStore) -> Result<Vec<Incident>, StoreError> {
    let options = ListOptions::default()
        .filter(active_filter())
        .sort(Sort::desc(Field::Created));
    CollectionClient::<Incident>::new(store).list(&options).await
}

/// Search criteria for the case list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseQuery {
    /// Substring matched against title, description, and address.
    pub search: Option<String>,
    /// Exact status.
    pub status: Option<CaseStatus>,
    /// Exact priority label.
    pub priority: Option<String>,
}

impl CaseQuery {
    /// Structured filter for this query, or `None` to list everything.
    #[must_use]
    pub fn filter(&self) -> Option<Filter> {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .and_then(|term| Filter::search(SEARCH_FIELDS, term));
        let status = self.status.as_ref().map(|s| Filter::eq(Field::Status, s));
        let priority = self
            .priority
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| Filter::eq(Field::Priority, p));

        Filter::all([search, status, priority].into_iter().flatten())
    }

    /// List options for this query, newest first.
    #[must_use]
    pub fn list_options(&self) -> ListOptions {
        ListOptions::default()
            .filter(self.filter())
            .sort(Sort::desc(Field::Created))
    }
}

/// Lists cases matching `query`, newest first.
///
/// # Errors
///
/// Returns [`StoreError`] if the list request fails.
pub async fn list_cases(
    store: &dyn RecordStore,
    query: &CaseQuery,
) -> Result<Vec<Incident>, StoreError> {
    CollectionClient::<Incident>::new(store)
        .list(&query.list_options())
        .await
}

/// Fields an operator fills in when attending a case.
///
/// Blank (empty or whitespace-only) values leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendForm {
    /// New status.
    pub status: Option<CaseStatus>,
    /// Phone number of the officer taking the case.
    pub assigned_to: Option<String>,
    /// Operator notes.
    pub notes: Option<String>,
    /// Who reported the case.
    pub reporter_type: Option<String>,
    /// Additional notes.
    pub additional_notes: Option<String>,
    /// Planned follow-up.
    pub next_steps: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

impl AttendForm {
    /// Partial update carrying only the filled-in fields.
    #[must_use]
    pub fn to_patch(&self) -> IncidentPatch {
        IncidentPatch {
            status: self.status.clone(),
            assigned_to: non_blank(self.assigned_to.as_ref()),
            notes: non_blank(self.notes.as_ref()),
            reporter_type: non_blank(self.reporter_type.as_ref()),
            additional_notes: non_blank(self.additional_notes.as_ref()),
            next_steps: non_blank(self.next_steps.as_ref()),
            ..IncidentPatch::default()
        }
    }

    /// Returns `true` if submitting the form would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_patch() == IncidentPatch::default()
    }
}

/// Applies an attend form to case `id` and returns the updated record.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if the case does not exist, or another
/// [`StoreError`] if the update is rejected.
pub async fn attend_case(
    store: &dyn RecordStore,
    id: &str,
    form: &AttendForm,
) -> Result<Incident, StoreError> {
    let cases = CollectionClient::<Incident>::new(store);
    if form.is_empty() {
        log::debug!("Attend form for case {id} is empty, nothing to update");
        return cases.get(id, &[]).await;
    }
    let updated = cases.update(id, &form.to_patch()).await?;
    log::info!(
        "Case {id} attended: status={}, assigned_to={:?}",
        updated.status,
        updated.assigned_to
    );
    Ok(updated)
}
