#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the patrol desk console.
//!
//! [`init_logger`] routes `log` output through `indicatif-log-bridge` so
//! log lines scroll above any live bar instead of tearing it.
//! [`IndicatifProgress`] renders CSV imports and [`StatusLine`] keeps the
//! feed connection state pinned at the bottom of the terminal.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use patrol_desk_violations::ProgressCallback;

pub use indicatif::MultiProgress;

/// Filter used when `RUST_LOG` is unset: the console's own crates at
/// `info`, everything else at `warn`.
pub const DEFAULT_FILTER: &str = "warn,patrol_desk=info,patrol_desk_feed=info,patrol_desk_violations=info,patrol_desk_store=info,patrol_desk_analytics=info";

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Import progress bar.
///
/// Spins until the importer reports how many rows it will write, then
/// switches to a counted bar.
pub struct IndicatifProgress {
    bar: ProgressBar,
    counted: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds an import bar labelled `message` to `multi`.
    #[must_use]
    pub fn records_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_style(spinner_style("{spinner:.cyan} {msg}"));
        bar.set_message(message.to_string());

        let counted = ProgressStyle::with_template(
            "  {msg} {wide_bar:.cyan/dim} {pos}/{len} rows [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");

        Arc::new(Self { bar, counted })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.reset();
        self.bar.set_style(self.counted.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn relabel(&self, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn complete(&self, summary: &str) {
        self.bar.finish_with_message(summary.to_string());
    }

    fn abandon(&self) {
        self.bar.abandon();
    }
}

/// A spinner line pinned below the scrolling log.
pub struct StatusLine {
    bar: ProgressBar,
}

impl StatusLine {
    /// Adds the line to `multi`.
    #[must_use]
    pub fn new(multi: &MultiProgress, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(250));
        bar.set_style(spinner_style("{spinner:.yellow} {msg} [{elapsed}]"));
        bar.set_message(message.to_string());
        Self { bar }
    }

    /// Replaces the message.
    pub fn set(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Removes the line.
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Installs the global logger behind `indicatif-log-bridge`.
///
/// `RUST_LOG` wins when set; otherwise [`DEFAULT_FILTER`] applies. Returns
/// the [`MultiProgress`] every bar and status line must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&filter)
        .build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_err()
    {
        log::debug!("Logger already installed");
    }
    log::set_max_level(level);

    multi
}
