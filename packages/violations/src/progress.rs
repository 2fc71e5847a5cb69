//! Progress reporting for bulk imports.
//!
//! The importer only talks to [`ProgressCallback`]; the CLI plugs in
//! `indicatif` bars, headless callers use [`LogProgress`], and tests use
//! [`NullProgress`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress from an import.
///
/// Shared by reference across `.await` points, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of rows about to be written.
    fn set_total(&self, total: u64);

    /// `delta` more rows were handled (created or rejected).
    fn inc(&self, delta: u64);

    /// Replaces the label shown next to the counter.
    fn relabel(&self, label: &str);

    /// The import completed.
    fn complete(&self, summary: &str);

    /// The import stopped early. No summary follows.
    fn abandon(&self);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn relabel(&self, _label: &str) {}
    fn complete(&self, _summary: &str) {}
    fn abandon(&self) {}
}

/// Logs a line every `every` rows and on completion. For output that is
/// not a terminal.
pub struct LogProgress {
    every: u64,
    total: AtomicU64,
    done: AtomicU64,
}

impl LogProgress {
    /// Logs every `every` rows (at least 1).
    #[must_use]
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            total: AtomicU64::new(0),
            done: AtomicU64::new(0),
        }
    }

    /// Rows handled so far.
    #[must_use]
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ProgressCallback for LogProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    fn inc(&self, delta: u64) {
        let before = self.done.fetch_add(delta, Ordering::Relaxed);
        let after = before + delta;
        if after / self.every > before / self.every {
            log::info!(
                "  {after}/{} rows",
                self.total.load(Ordering::Relaxed)
            );
        }
    }

    fn relabel(&self, label: &str) {
        log::info!("{label}");
    }

    // The importer logs its own summary.
    fn complete(&self, _summary: &str) {}

    fn abandon(&self) {
        log::warn!(
            "Stopped after {}/{} rows",
            self.done(),
            self.total.load(Ordering::Relaxed)
        );
    }
}
