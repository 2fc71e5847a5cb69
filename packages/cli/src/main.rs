#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Operator console for the patrol desk.
//!
//! `patrol_desk watch` mounts the live incident feed and reports arrivals,
//! departures, and connection changes until Ctrl-C. The remaining
//! subcommands cover the case, violation, directory, and statistics pages.
//! With no subcommand an interactive menu is shown.
//!
//! Uses `indicatif-log-bridge` (via [`patrol_desk_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the status spinner never fight for the terminal.

mod commands;
mod config;
mod interactive;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use patrol_desk_analytics::DateWindow;
use patrol_desk_case_models::CaseStatus;
use patrol_desk_case_models::resources::SuggestionFlag;
use patrol_desk_store::cases::{AttendForm, CaseQuery};
use patrol_desk_store::directory::StationQuery;
use patrol_desk_violations::{SortedFilter, ViolationQuery};

use crate::commands::Context;

#[derive(Parser)]
#[command(name = "patrol_desk", about = "Patrol desk operator console")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the live map of active cases until Ctrl-C
    Watch,
    /// List cases
    Cases {
        /// Substring of the title, description, or address
        #[arg(long)]
        search: Option<String>,
        /// Exact status (e.g. "Open", "Ongoing")
        #[arg(long)]
        status: Option<CaseStatus>,
        /// Exact priority label
        #[arg(long)]
        priority: Option<String>,
    },
    /// Attend a case: change its status, assign an officer, add notes
    Attend {
        /// Case ID
        id: String,
        /// New status
        #[arg(long)]
        status: Option<CaseStatus>,
        /// Phone number of the officer to assign; they are messaged if a
        /// gateway is configured
        #[arg(long)]
        assign: Option<String>,
        /// Operator notes
        #[arg(long)]
        notes: Option<String>,
        /// Who reported the case
        #[arg(long)]
        reporter_type: Option<String>,
        /// Additional notes
        #[arg(long)]
        additional_notes: Option<String>,
        /// Planned follow-up
        #[arg(long)]
        next_steps: Option<String>,
    },
    /// List traffic violations
    Violations {
        /// Substring of the licence number
        #[arg(long)]
        search: Option<String>,
        /// `all`, `sorted`, or `unsorted`
        #[arg(long, default_value = "all")]
        sorted: SortedFilter,
    },
    /// Flip a violation between sorted and unsorted
    ToggleViolation {
        /// Violation ID
        id: String,
    },
    /// Delete a violation
    DeleteViolation {
        /// Violation ID
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Import traffic violations from a CSV file with a `licence_number`
    /// column and an optional `isSorted` column
    ImportViolations {
        /// CSV file
        csv: PathBuf,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Dashboard statistics
    Stats {
        /// Only count records created in the last N days (all time if
        /// omitted)
        #[arg(long)]
        days: Option<u32>,
    },
    /// List police stations
    Stations {
        /// Substring of the station name, officer in charge, or number
        #[arg(long)]
        search: Option<String>,
        /// Exact province
        #[arg(long)]
        province: Option<String>,
        /// Only operating (`true`) or closed (`false`) stations
        #[arg(long)]
        active: Option<bool>,
        /// Exact specialty
        #[arg(long)]
        specialty: Option<String>,
    },
    /// List publications
    News {
        /// Substring of the title or author
        #[arg(long)]
        search: Option<String>,
    },
    /// List suggestion box entries
    Suggestions {
        /// `complaint`, `comment`, `suggestion`, or `other`
        #[arg(long, value_parser = parse_flag)]
        flag: Option<SuggestionFlag>,
        /// Substring of the comment
        #[arg(long)]
        search: Option<String>,
    },
}

fn parse_flag(s: &str) -> Result<SuggestionFlag, String> {
    s.trim()
        .to_uppercase()
        .parse()
        .map_err(|_| format!("unknown flag '{s}'"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = patrol_desk_cli_utils::init_logger();
    let cli = Cli::parse();
    let ctx = Context::connect(multi).await?;

    let Some(command) = cli.command else {
        return interactive::run(&ctx).await;
    };

    match command {
        Commands::Watch => commands::watch(&ctx).await?,
        Commands::Cases {
            search,
            status,
            priority,
        } => {
            let query = CaseQuery {
                search,
                status,
                priority,
            };
            commands::cases(&ctx, &query).await?;
        }
        Commands::Attend {
            id,
            status,
            assign,
            notes,
            reporter_type,
            additional_notes,
            next_steps,
        } => {
            let form = AttendForm {
                status,
                assigned_to: assign,
                notes,
                reporter_type,
                additional_notes,
                next_steps,
            };
            commands::attend(&ctx, &id, &form).await?;
        }
        Commands::Violations { search, sorted } => {
            commands::violations(&ctx, &ViolationQuery { search, sorted }).await?;
        }
        Commands::ToggleViolation { id } => commands::toggle_violation(&ctx, &id).await?,
        Commands::DeleteViolation { id, yes } => {
            commands::remove_violation(&ctx, &id, yes).await?;
        }
        Commands::ImportViolations { csv, yes } => {
            commands::import_violations(&ctx, &csv, yes).await?;
        }
        Commands::Stats { days } => commands::stats(&ctx, DateWindow::from_days(days)).await?,
        Commands::Stations {
            search,
            province,
            active,
            specialty,
        } => {
            let query = StationQuery {
                search,
                province,
                active,
                specialty,
                ..StationQuery::default()
            };
            commands::stations(&ctx, &query).await?;
        }
        Commands::News { search } => commands::publications(&ctx, search.as_deref()).await?,
        Commands::Suggestions { flag, search } => {
            commands::suggestions(&ctx, flag, search.as_deref()).await?;
        }
    }

    Ok(())
}
