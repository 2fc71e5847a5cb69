//! Terminal rendering of the live feed.

use std::collections::BTreeSet;
use std::sync::Arc;

use patrol_desk_cli_utils::StatusLine;
use patrol_desk_feed::{
    AlertDispatcher, BellBackend, FeedState, FeedStatus, LiveFeed, LogBackend, MapView,
};
use patrol_desk_store::RecordStore;

use crate::config::{AlertMode, DeskConfig};

/// What changed between two published feed states.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Changes {
    /// IDs that entered the feed.
    pub arrived: Vec<String>,
    /// IDs that left the feed.
    pub departed: Vec<String>,
}

/// Tracks published states and reports differences.
#[derive(Debug, Default)]
pub struct Watcher {
    map: MapView,
    known: BTreeSet<String>,
    notice: Option<String>,
}

impl Watcher {
    /// Takes in a new state, logs arrivals, departures, and notices, and
    /// returns what changed.
    pub fn observe(&mut self, state: &FeedState) -> Changes {
        self.map.sync(&state.set);

        let current: BTreeSet<String> = state.set.ids().into_iter().map(str::to_string).collect();
        let mut changes = Changes::default();

        for marker in self.map.markers() {
            if self.known.contains(&marker.id) {
                continue;
            }
            log::info!(
                "{} {} \"{}\" at {:.5}, {:.5}{}",
                marker.category,
                marker.id,
                marker.title,
                marker.coordinates.latitude,
                marker.coordinates.longitude,
                if marker.fresh { " (new)" } else { "" }
            );
            changes.arrived.push(marker.id);
        }
        for incident in self.map.unplaced() {
            if self.known.contains(&incident.id) {
                continue;
            }
            log::info!(
                "{} \"{}\" has no location ({})",
                incident.id,
                incident.title,
                incident.status
            );
            changes.arrived.push(incident.id.clone());
        }
        changes.arrived.sort();

        changes.departed = self.known.difference(&current).cloned().collect();
        for id in &changes.departed {
            log::info!("{id} left the feed");
        }
        self.known = current;

        if state.notice != self.notice {
            if let Some(notice) = &state.notice {
                log::warn!("{notice}");
            }
            self.notice.clone_from(&state.notice);
        }

        changes
    }

    /// One-line summary for the status spinner.
    #[must_use]
    pub fn status_line(&self, status: FeedStatus) -> String {
        let center = self.map.center();
        format!(
            "{} | {} active | centre {:.4}, {:.4}",
            describe(status),
            self.map.set().len(),
            center.latitude,
            center.longitude
        )
    }
}

fn describe(status: FeedStatus) -> String {
    match status {
        FeedStatus::Connecting => "Connecting".to_string(),
        FeedStatus::Live => "Live".to_string(),
        FeedStatus::Reconnecting { attempt } => format!("Reconnecting (attempt {attempt})"),
        FeedStatus::GaveUp => "Disconnected".to_string(),
        FeedStatus::Stopped => "Stopped".to_string(),
    }
}

fn alerts(mode: AlertMode) -> (Option<AlertDispatcher>, Option<tokio::task::JoinHandle<()>>) {
    match mode {
        AlertMode::Bell => {
            let (dispatcher, task) = AlertDispatcher::spawn(BellBackend);
            (Some(dispatcher), Some(task))
        }
        AlertMode::Log => {
            let (dispatcher, task) = AlertDispatcher::spawn(LogBackend);
            (Some(dispatcher), Some(task))
        }
        AlertMode::Off => (None, None),
    }
}

/// Mounts the live feed and reports changes until Ctrl-C or until the
/// feed gives up reconnecting.
///
/// # Errors
///
/// Returns an error if the alert task panicked.
pub async fn run(
    store: Arc<dyn RecordStore>,
    config: &DeskConfig,
    multi: &patrol_desk_cli_utils::MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let (dispatcher, alert_task) = alerts(config.feed.alerts);
    let feed = LiveFeed::mount(store, config.feed.reconnect, dispatcher);
    let mut states = feed.state();
    let status = StatusLine::new(multi, "Connecting to case feed");
    let mut watcher = Watcher::default();

    log::info!("Watching active cases, press Ctrl-C to stop");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    log::error!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    log::warn!("Live feed stopped");
                    break;
                }
                let state = states.borrow_and_update().clone();
                watcher.observe(&state);
                status.set(watcher.status_line(state.status));
                if state.status == FeedStatus::GaveUp {
                    log::error!("Gave up reconnecting to the case feed");
                    break;
                }
            }
        }
    }

    status.clear();
    feed.teardown().await;
    if let Some(task) = alert_task {
        task.await?;
    }
    log::info!("Stopped watching");
    Ok(())
}
