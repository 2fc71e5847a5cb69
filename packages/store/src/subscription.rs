//! Handle for an open realtime subscription.

use patrol_desk_store_models::RecordEvent;
use tokio::sync::mpsc;

use crate::StoreError;

/// Buffer between the transport task and the consumer.
pub const EVENT_CHANNEL_BUFFER: usize = 256;

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// An open realtime subscription.
///
/// Events arrive in the order the store sent them. An `Err` item means the
/// underlying connection failed; no further events follow it.
///
/// The release hook runs exactly once: on [`Subscription::unsubscribe`] or,
/// failing that, on drop.
pub struct Subscription {
    key: String,
    events: mpsc::Receiver<Result<RecordEvent, StoreError>>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    /// Wraps a receiver and the hook that tears down the transport.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        events: mpsc::Receiver<Result<RecordEvent, StoreError>>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Subscription key, e.g. `"cases/*"`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the next event. `None` once the transport is gone.
    pub async fn next(&mut self) -> Option<Result<RecordEvent, StoreError>> {
        self.events.recv().await
    }

    /// Releases the subscription.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            log::debug!("Releasing subscription {}", self.key);
            self.events.close();
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn release_runs_once_on_unsubscribe() {
        let count = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::channel(1);
        let hook_count = Arc::clone(&count);
        let sub = Subscription::new("cases/*", rx, move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_runs_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::channel(1);
        let hook_count = Arc::clone(&count);
        drop(Subscription::new("cases/*", rx, move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
