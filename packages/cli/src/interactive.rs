//! Menu-driven console using `dialoguer`, for operators who do not want
//! to remember subcommand flags.

use std::path::PathBuf;

use dialoguer::{Input, Select};
use patrol_desk_analytics::DateWindow;
use patrol_desk_case_models::CaseStatus;
use patrol_desk_case_models::resources::SuggestionFlag;
use patrol_desk_store::cases::{AttendForm, CaseQuery};
use patrol_desk_store::directory::StationQuery;
use patrol_desk_violations::{SortedFilter, ViolationQuery};

use crate::commands::{self, Context};

/// Top-level actions available in the interactive menu.
enum Action {
    Watch,
    Cases,
    Attend,
    Violations,
    ToggleViolation,
    ImportViolations,
    Stats,
    Stations,
    News,
    Suggestions,
}

impl Action {
    const ALL: &[Self] = &[
        Self::Watch,
        Self::Cases,
        Self::Attend,
        Self::Violations,
        Self::ToggleViolation,
        Self::ImportViolations,
        Self::Stats,
        Self::Stations,
        Self::News,
        Self::Suggestions,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Watch => "Watch live map",
            Self::Cases => "List cases",
            Self::Attend => "Attend a case",
            Self::Violations => "List traffic violations",
            Self::ToggleViolation => "Mark violation sorted / unsorted",
            Self::ImportViolations => "Import violations from CSV",
            Self::Stats => "Dashboard statistics",
            Self::Stations => "Police station directory",
            Self::News => "Publications",
            Self::Suggestions => "Suggestion box",
        }
    }
}

const CASE_STATUSES: &[&str] = &["Any", "Open", "Ongoing", "Resolved", "Cancelled"];
const WINDOWS: &[&str] = &["Last 7 days", "Last 30 days", "Last 90 days", "All time"];

fn prompt_optional(prompt: &str) -> Result<Option<String>, dialoguer::Error> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn prompt_required(prompt: &str) -> Result<String, dialoguer::Error> {
    Input::new().with_prompt(prompt).interact_text()
}

fn select(prompt: &str, items: &[&str]) -> Result<usize, dialoguer::Error> {
    Select::new()
        .with_prompt(prompt)
        .items(items)
        .default(0)
        .interact()
}

fn prompt_status(prompt: &str) -> Result<Option<CaseStatus>, dialoguer::Error> {
    let idx = select(prompt, CASE_STATUSES)?;
    Ok((idx > 0).then(|| CaseStatus::from(CASE_STATUSES[idx])))
}

/// Runs the interactive menu, prompting the operator to pick and
/// configure one action.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected action fails.
pub async fn run(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    println!("Patrol Desk");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
    let idx = select("What would you like to do?", &labels)?;

    match Action::ALL[idx] {
        Action::Watch => commands::watch(ctx).await?,
        Action::Cases => {
            let query = CaseQuery {
                search: prompt_optional("Search (empty for all)")?,
                status: prompt_status("Status")?,
                priority: prompt_optional("Priority (empty for any)")?,
            };
            commands::cases(ctx, &query).await?;
        }
        Action::Attend => {
            let id = prompt_required("Case ID")?;
            let form = AttendForm {
                status: prompt_status("New status (Any keeps the current one)")?,
                assigned_to: prompt_optional("Assign to officer phone (empty to skip)")?,
                notes: prompt_optional("Notes (empty to skip)")?,
                reporter_type: prompt_optional("Reporter type (empty to skip)")?,
                additional_notes: prompt_optional("Additional notes (empty to skip)")?,
                next_steps: prompt_optional("Next steps (empty to skip)")?,
            };
            commands::attend(ctx, id.trim(), &form).await?;
        }
        Action::Violations => {
            let sorted = [
                SortedFilter::All,
                SortedFilter::Sorted,
                SortedFilter::Unsorted,
            ][select("Show", &["All", "Sorted", "Unsorted"])?];
            let query = ViolationQuery {
                search: prompt_optional("Licence number contains (empty for all)")?,
                sorted,
            };
            commands::violations(ctx, &query).await?;
        }
        Action::ToggleViolation => {
            let id = prompt_required("Violation ID")?;
            commands::toggle_violation(ctx, id.trim()).await?;
        }
        Action::ImportViolations => {
            let path = prompt_required("CSV file")?;
            commands::import_violations(ctx, &PathBuf::from(path.trim()), false).await?;
        }
        Action::Stats => {
            let window = match select("Time range", WINDOWS)? {
                0 => DateWindow::LastDays(7),
                1 => DateWindow::LastDays(30),
                2 => DateWindow::LastDays(90),
                _ => DateWindow::AllTime,
            };
            commands::stats(ctx, window).await?;
        }
        Action::Stations => {
            let active = match select("Stations", &["All", "Active", "Inactive"])? {
                1 => Some(true),
                2 => Some(false),
                _ => None,
            };
            let query = StationQuery {
                search: prompt_optional("Search (empty for all)")?,
                province: prompt_optional("Province (empty for any)")?,
                active,
                ..StationQuery::default()
            };
            commands::stations(ctx, &query).await?;
        }
        Action::News => {
            let search = prompt_optional("Search (empty for all)")?;
            commands::publications(ctx, search.as_deref()).await?;
        }
        Action::Suggestions => {
            let flags = [
                None,
                Some(SuggestionFlag::Complaint),
                Some(SuggestionFlag::Comment),
                Some(SuggestionFlag::Suggestion),
                Some(SuggestionFlag::Other),
            ];
            let flag = flags[select(
                "Type",
                &["All", "Complaint", "Comment", "Suggestion", "Other"],
            )?];
            let search = prompt_optional("Comment contains (empty for all)")?;
            commands::suggestions(ctx, flag, search.as_deref()).await?;
        }
    }

    Ok(())
}
