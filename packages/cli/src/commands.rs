//! Subcommand implementations shared by the flag-driven and interactive
//! entry points.

use std::io::IsTerminal as _;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use dialoguer::Confirm;
use patrol_desk_analytics::{DashboardStats, DateWindow, dashboard_stats};
use patrol_desk_case_models::Incident;
use patrol_desk_case_models::resources::{SuggestionFlag, TrafficViolation};
use patrol_desk_cli_utils::{IndicatifProgress, MultiProgress, StatusLine};
use patrol_desk_store::cases::{AttendForm, CaseQuery, attend_case, list_cases};
use patrol_desk_store::directory::{
    StationQuery, list_publications, list_stations, list_suggestions,
};
use patrol_desk_store::messenger::OfficerMessenger;
use patrol_desk_store::pocketbase::PocketBaseStore;
use patrol_desk_store::{CollectionClient, RecordStore};
use patrol_desk_store_models::Collection;
use patrol_desk_violations::{
    LogProgress, ProgressCallback, ViolationQuery, delete_violation, import, list_violations,
    parse_file, preview, toggle_sorted,
};

use crate::config::DeskConfig;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Loaded configuration plus a connected store.
pub struct Context {
    /// Console configuration.
    pub config: DeskConfig,
    /// Connected store.
    pub store: Arc<PocketBaseStore>,
    /// Progress bar host.
    pub multi: MultiProgress,
}

impl Context {
    /// Loads configuration and signs in.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or sign-in fails.
    pub async fn connect(multi: MultiProgress) -> Result<Self, Box<dyn std::error::Error>> {
        let config = DeskConfig::load()?;
        log::debug!("Connecting to {}", config.store.base_url());
        let store = Arc::new(PocketBaseStore::connect(&config.store).await?);
        Ok(Self {
            config,
            store,
            multi,
        })
    }

    fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }
}

/// Mounts the live feed until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the watcher fails.
pub async fn watch(ctx: &Context) -> CmdResult {
    let store: Arc<dyn RecordStore> = ctx.store.clone();
    crate::watch::run(store, &ctx.config, &ctx.multi).await
}

fn print_cases(cases: &[Incident]) {
    println!(
        "{:<16} {:<12} {:<8} {:<28} ADDRESS",
        "ID", "STATUS", "PRIORITY", "TITLE"
    );
    println!("{}", "-".repeat(90));
    for case in cases {
        println!(
            "{:<16} {:<12} {:<8} {:<28} {}",
            case.id,
            case.status,
            case.priority.as_deref().unwrap_or("-"),
            case.title,
            case.address.as_deref().unwrap_or("")
        );
    }
    println!("{} case(s)", cases.len());
}

/// Lists cases.
///
/// # Errors
///
/// Returns an error if the list request fails.
pub async fn cases(ctx: &Context, query: &CaseQuery) -> CmdResult {
    let cases = list_cases(ctx.store(), query).await?;
    print_cases(&cases);
    Ok(())
}

/// Attends a case and, if it was assigned, messages the officer.
///
/// # Errors
///
/// Returns an error if the update fails. A failed officer message is
/// logged, not returned, since the case itself was saved.
pub async fn attend(ctx: &Context, id: &str, form: &AttendForm) -> CmdResult {
    let updated = attend_case(ctx.store(), id, form).await?;
    println!(
        "Case {} is now {} (step {} of 3)",
        updated.id,
        updated.status,
        updated.status.progress_step()
    );

    if form.to_patch().assigned_to.is_none() {
        return Ok(());
    }
    match OfficerMessenger::from_config(&ctx.config.store) {
        Some(messenger) => match messenger.notify_assignment(&updated).await {
            Ok(reply) => log::info!("Officer notified via {}: {reply}", messenger.url()),
            Err(e) => log::error!("Case saved but officer message failed: {e}"),
        },
        None => log::warn!("No message gateway configured, officer was not notified"),
    }
    Ok(())
}

fn print_violations(violations: &[TrafficViolation]) {
    println!("{:<16} {:<16} {:<8} CREATED", "ID", "LICENCE", "SORTED");
    println!("{}", "-".repeat(64));
    for v in violations {
        println!(
            "{:<16} {:<16} {:<8} {}",
            v.id,
            v.licence_number,
            if v.is_sorted { "yes" } else { "no" },
            v.created
                .map(|c| c.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default()
        );
    }
    println!("{} violation(s)", violations.len());
}

/// Lists traffic violations.
///
/// # Errors
///
/// Returns an error if the list request fails.
pub async fn violations(ctx: &Context, query: &ViolationQuery) -> CmdResult {
    let violations = list_violations(ctx.store(), query).await?;
    print_violations(&violations);
    Ok(())
}

/// Flips a violation between sorted and unsorted.
///
/// # Errors
///
/// Returns an error if the violation is missing or the update fails.
pub async fn toggle_violation(ctx: &Context, id: &str) -> CmdResult {
    let current = CollectionClient::<TrafficViolation>::new(ctx.store())
        .get(id, &[])
        .await?;
    let updated = toggle_sorted(ctx.store(), &current).await?;
    println!(
        "{} is now {}",
        updated.licence_number,
        if updated.is_sorted { "sorted" } else { "unsorted" }
    );
    Ok(())
}

/// Deletes a violation after confirmation.
///
/// # Errors
///
/// Returns an error if the prompt or the delete fails.
pub async fn remove_violation(ctx: &Context, id: &str, yes: bool) -> CmdResult {
    if !yes
        && !Confirm::new()
            .with_prompt(format!("Delete violation {id}?"))
            .default(false)
            .interact()?
    {
        println!("Cancelled.");
        return Ok(());
    }
    delete_violation(ctx.store(), id).await?;
    println!("Deleted {id}");
    Ok(())
}

/// Previews and imports a violations CSV.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the store becomes
/// unreachable.
pub async fn import_violations(ctx: &Context, path: &Path, yes: bool) -> CmdResult {
    let file = std::fs::File::open(path)?;
    let head = preview(std::io::BufReader::new(file))?;
    println!("{}", head.headers.join(" | "));
    for row in &head.rows {
        println!("{}", row.join(" | "));
    }

    let parsed = parse_file(path)?;
    println!(
        "{} row(s) ready, {} skipped without a licence number",
        parsed.rows.len(),
        parsed.skipped
    );
    if parsed.rows.is_empty() {
        return Ok(());
    }
    if !yes
        && !Confirm::new()
            .with_prompt(format!("Import {} violation(s)?", parsed.rows.len()))
            .default(true)
            .interact()?
    {
        println!("Cancelled.");
        return Ok(());
    }

    let progress: Arc<dyn ProgressCallback> = if std::io::stderr().is_terminal() {
        IndicatifProgress::records_bar(&ctx.multi, "Importing violations")
    } else {
        Arc::new(LogProgress::default())
    };
    let summary = import(ctx.store(), &parsed, progress.as_ref()).await?;
    println!(
        "Imported {}, skipped {}, failed {}",
        summary.imported, summary.skipped, summary.failed
    );
    Ok(())
}

fn print_stats(stats: &DashboardStats) {
    println!(
        "Violations    {:>6}  ({} sorted, {} unsorted)",
        stats.violations.total,
        stats.violations.sorted,
        stats.violations.unsorted()
    );
    println!(
        "Cases         {:>6}  ({} open, {} in progress, {} resolved)",
        stats.cases.total, stats.cases.open, stats.cases.in_progress, stats.cases.resolved
    );
    println!(
        "Stations      {:>6}  ({} active)",
        stats.stations.total, stats.stations.active
    );
    println!("Publications  {:>6}", stats.publications);

    println!();
    println!("{:<8} {:>10} {:>6}", "MONTH", "VIOLATIONS", "CASES");
    for (v, c) in stats.trends.violations.iter().zip(&stats.trends.cases) {
        println!("{:<8} {:>10} {:>6}", v.period, v.count, c.count);
    }

    println!();
    println!("Recent activity");
    for item in &stats.recent_activity {
        println!(
            "  {:<16} {:<12} {:<28} {}{}",
            item.created
                .map(|c| c.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            item.kind,
            item.label,
            item.id,
            if item.settled { " (done)" } else { "" }
        );
    }
}

/// Prints dashboard statistics.
///
/// # Errors
///
/// Returns an error if any collection cannot be fetched.
pub async fn stats(ctx: &Context, window: DateWindow) -> CmdResult {
    let status = StatusLine::new(&ctx.multi, "Fetching dashboard data");
    let result = dashboard_stats(ctx.store(), window, Utc::now()).await;
    status.clear();
    print_stats(&result?);
    Ok(())
}

/// Lists police stations.
///
/// # Errors
///
/// Returns an error if the list request fails.
pub async fn stations(ctx: &Context, query: &StationQuery) -> CmdResult {
    let stations = list_stations(ctx.store(), query).await?;
    println!(
        "{:<24} {:<14} {:<20} {:<8} PHONE",
        "STATION", "PROVINCE", "IN CHARGE", "ACTIVE"
    );
    println!("{}", "-".repeat(84));
    for s in &stations {
        println!(
            "{:<24} {:<14} {:<20} {:<8} {}",
            s.station,
            s.province,
            s.member_in_charge,
            if s.active { "yes" } else { "no" },
            s.station_number
        );
    }
    println!("{} station(s)", stations.len());
    Ok(())
}

/// Lists publications with attachment links.
///
/// # Errors
///
/// Returns an error if the list request fails.
pub async fn publications(ctx: &Context, search: Option<&str>) -> CmdResult {
    let publications = list_publications(ctx.store(), search).await?;
    let base_url = ctx.config.store.base_url();
    for p in &publications {
        println!("{} ({})", p.title, p.author);
        if let Some(url) = p.file_url(base_url, Collection::News.as_ref()) {
            println!("  {url}");
        }
    }
    println!("{} publication(s)", publications.len());
    Ok(())
}

/// Lists suggestion box entries.
///
/// # Errors
///
/// Returns an error if the list request fails.
pub async fn suggestions(
    ctx: &Context,
    flag: Option<SuggestionFlag>,
    search: Option<&str>,
) -> CmdResult {
    let suggestions = list_suggestions(ctx.store(), flag, search).await?;
    for s in &suggestions {
        println!("[{}] {}", s.flag().label(), s.comment);
    }
    println!("{} entr(ies)", suggestions.len());
    Ok(())
}
