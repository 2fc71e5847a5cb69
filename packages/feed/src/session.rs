//! A mounted live feed: snapshot, subscription, and reconnect loop.
//!
//! [`LiveFeed::mount`] spawns one task that owns the feed set and the
//! realtime subscription. Events are applied strictly one at a time on
//! that task, and every change is published as a [`FeedState`] over a
//! `watch` channel.
//!
//! The subscription is always opened before the snapshot is fetched. On
//! the initial mount a failed snapshot leaves the feed empty with a notice
//! and is not retried; live events still apply. When the
//! subscription fails, the current set is kept, the task backs off per
//! [`ReconnectPolicy`], resubscribes, and replaces the set with a fresh
//! snapshot.

use std::sync::Arc;
use std::time::Duration;

use patrol_desk_case_models::Incident;
use patrol_desk_store::{RecordStore, StoreError, Subscription, cases};
use patrol_desk_store_models::{Collection, RecordEvent, Topic};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::alerts::AlertDispatcher;
use crate::reducer::FeedSet;

/// Errors surfaced by the feed task. None of them are fatal; they become
/// notices or trigger a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The active-case snapshot could not be fetched.
    #[error("Failed to load active cases: {0}")]
    Snapshot(#[source] StoreError),
    /// The realtime subscription could not be opened.
    #[error("Failed to subscribe to case events: {0}")]
    Subscribe(#[source] StoreError),
    /// The realtime stream reported an error.
    #[error("Case event stream failed: {0}")]
    Stream(#[source] StoreError),
    /// The realtime stream ended.
    #[error("Case event stream closed")]
    Closed,
}

/// Backoff between reconnect attempts.
///
/// Attempt `n` (1-based) waits `initial_delay_ms * 2^(n-1)`, capped at
/// `max_delay_ms`. With `max_attempts` unset the feed never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }

    /// Whether attempt `attempt` (1-based) may be made.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

/// Connection state of a mounted feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Loading the snapshot and opening the subscription.
    Connecting,
    /// Subscribed; events are being applied.
    Live,
    /// Disconnected; waiting before reconnect attempt `attempt`.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Reconnect attempts exhausted. The last known set is kept.
    GaveUp,
    /// Torn down.
    Stopped,
}

/// What a mounted feed publishes after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    /// The active incidents.
    pub set: FeedSet,
    /// Connection state.
    pub status: FeedStatus,
    /// Transient message for the operator, e.g. a failed snapshot.
    pub notice: Option<String>,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            set: FeedSet::new(),
            status: FeedStatus::Connecting,
            notice: None,
        }
    }
}

/// A mounted live feed.
///
/// Dropping it aborts the task, which releases the subscription;
/// [`LiveFeed::teardown`] does the same gracefully.
#[derive(Debug)]
pub struct LiveFeed {
    state: watch::Receiver<FeedState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// Mounts the feed on the current runtime.
    #[must_use]
    pub fn mount(
        store: Arc<dyn RecordStore>,
        policy: ReconnectPolicy,
        alerts: Option<AlertDispatcher>,
    ) -> Self {
        let (state_tx, state) = watch::channel(FeedState::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let runner = Runner {
            store,
            policy,
            alerts,
            state_tx,
            set: FeedSet::new(),
            status: FeedStatus::Connecting,
            notice: None,
        };
        let task = tokio::spawn(runner.run(shutdown_rx));

        Self {
            state,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// A receiver for published states.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    /// The latest published state.
    #[must_use]
    pub fn current(&self) -> FeedState {
        self.state.borrow().clone()
    }

    /// Stops the feed and waits for the subscription to be released.
    pub async fn teardown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            log::error!("Live feed task failed: {e}");
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Runner {
    store: Arc<dyn RecordStore>,
    policy: ReconnectPolicy,
    alerts: Option<AlertDispatcher>,
    state_tx: watch::Sender<FeedState>,
    set: FeedSet,
    status: FeedStatus,
    notice: Option<String>,
}

impl Runner {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut initial = true;
        let mut attempt: u32 = 0;

        loop {
            let connected = tokio::select! {
                result = self.connect(initial) => result,
                _ = &mut shutdown => break,
            };
            initial = false;

            match connected {
                Ok(mut subscription) => {
                    attempt = 0;
                    log::info!(
                        "Live feed subscribed to {} with {} active incidents",
                        subscription.key(),
                        self.set.len()
                    );
                    self.set_status(FeedStatus::Live);

                    let error = tokio::select! {
                        error = self.pump(&mut subscription) => error,
                        _ = &mut shutdown => {
                            subscription.unsubscribe();
                            break;
                        }
                    };
                    drop(subscription);
                    log::warn!(
                        "{error}; keeping {} incidents until reconnected",
                        self.set.len()
                    );
                }
                Err(e) => log::warn!("{e}"),
            }

            attempt += 1;
            if !self.policy.allows(attempt) {
                log::error!("Live feed giving up after {} attempts", attempt - 1);
                self.set_status(FeedStatus::GaveUp);
                return;
            }
            let delay = self.policy.delay(attempt);
            log::info!("Reconnecting live feed in {delay:?} (attempt {attempt})");
            self.set_status(FeedStatus::Reconnecting { attempt });

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => break,
            }
        }

        log::info!("Live feed stopped");
        self.set_status(FeedStatus::Stopped);
    }

    /// Subscribes before loading the snapshot so that changes made while
    /// the snapshot loads queue in the subscription and apply on top of it.
    ///
    /// On the initial mount a failed snapshot becomes a notice and a failed
    /// subscribe still loads the snapshot. On reconnect both must succeed.
    async fn connect(&mut self, initial: bool) -> Result<Subscription, FeedError> {
        let subscribed = self.subscribe().await;
        if subscribed.is_err() && !initial {
            return subscribed;
        }

        match self.fetch_snapshot().await {
            Ok(incidents) => self.replace(incidents),
            Err(e) if initial => {
                log::error!("{e}");
                self.notice = Some(e.to_string());
                self.publish();
            }
            Err(e) => return Err(e),
        }
        subscribed
    }

    async fn fetch_snapshot(&self) -> Result<Vec<Incident>, FeedError> {
        cases::list_active_cases(self.store.as_ref())
            .await
            .map_err(FeedError::Snapshot)
    }

    async fn subscribe(&self) -> Result<Subscription, FeedError> {
        self.store
            .subscribe(Collection::Cases, Topic::All)
            .await
            .map_err(FeedError::Subscribe)
    }

    fn replace(&mut self, incidents: Vec<Incident>) {
        log::debug!("Snapshot loaded with {} active incidents", incidents.len());
        self.set.replace_snapshot(incidents);
        self.notice = None;
        self.publish();
    }

    /// Applies events until the stream fails.
    async fn pump(&mut self, subscription: &mut Subscription) -> FeedError {
        loop {
            match subscription.next().await {
                Some(Ok(event)) => self.apply(&event),
                Some(Err(e)) => return FeedError::Stream(e),
                None => return FeedError::Closed,
            }
        }
    }

    fn apply(&mut self, event: &RecordEvent) {
        let transition = self.set.apply_record_event(event);
        if let Some(cue) = transition.cue()
            && let Some(alerts) = &self.alerts
        {
            alerts.dispatch(cue);
        }
        if transition.changed() {
            self.publish();
        }
    }

    fn set_status(&mut self, status: FeedStatus) {
        self.status = status;
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(FeedState {
            set: self.set.clone(),
            status: self.status,
            notice: self.notice.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use patrol_desk_store::memory::MemoryStore;

    use super::*;
    use crate::alerts::Cue;
    use crate::alerts::testing::RecordingBackend;

    fn fast_policy(max_attempts: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            max_attempts,
        }
    }

    fn seed(store: &MemoryStore, id: &str, title: &str, status: &str) {
        store.insert_raw(
            Collection::Cases,
            serde_json::json!({"id": id, "title": title, "status": status}),
        );
    }

    async fn wait_until(
        rx: &mut watch::Receiver<FeedState>,
        predicate: impl Fn(&FeedState) -> bool,
    ) -> FeedState {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| predicate(s)))
            .await
            .expect("timed out waiting for feed state")
            .expect("feed task ended")
            .clone()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(5), Duration::from_secs(16));
        assert_eq!(policy.delay(6), Duration::from_secs(30));
        assert_eq!(policy.delay(200), Duration::from_secs(30));
        assert!(policy.allows(u32::MAX));

        let bounded = ReconnectPolicy {
            max_attempts: Some(3),
            ..policy
        };
        assert!(bounded.allows(3));
        assert!(!bounded.allows(4));
    }

    #[test]
    fn policy_reads_partial_toml() {
        let policy: ReconnectPolicy = toml::from_str("max_delay_ms = 5000").unwrap();
        assert_eq!(policy.initial_delay_ms, 1_000);
        assert_eq!(policy.max_delay_ms, 5_000);
        assert_eq!(policy.max_attempts, None);
    }

    #[tokio::test]
    async fn snapshot_then_live_events() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "1", "Accident on Main St", "Open");
        seed(&store, "0", "Old robbery", "Resolved");

        let backend = RecordingBackend::default();
        let recorded = Arc::clone(&backend.recorded);
        let (alerts, worker) = AlertDispatcher::spawn(backend);

        let feed = LiveFeed::mount(store.clone(), fast_policy(None), Some(alerts));
        let mut rx = feed.state();

        let state = wait_until(&mut rx, |s| s.status == FeedStatus::Live).await;
        assert_eq!(state.set.ids(), vec!["1"]);
        assert!(state.notice.is_none());

        store
            .create(
                Collection::Cases,
                &serde_json::json!({"id": "2", "title": "SOS Alert", "status": "Open"}),
            )
            .await
            .unwrap();
        let state = wait_until(&mut rx, |s| s.set.contains("2")).await;
        assert_eq!(state.set.ids(), vec!["1", "2"]);

        store
            .update(Collection::Cases, "1", &serde_json::json!({"status": "Resolved"}))
            .await
            .unwrap();
        let state = wait_until(&mut rx, |s| !s.set.contains("1")).await;
        assert_eq!(state.set.ids(), vec!["2"]);

        store.delete(Collection::Cases, "2").await.unwrap();
        wait_until(&mut rx, |s| s.set.is_empty()).await;

        feed.teardown().await;
        assert_eq!(rx.borrow().status, FeedStatus::Stopped);
        assert_eq!(store.release_count(), 1);
        assert_eq!(store.active_subscriptions(), 0);

        worker.await.unwrap();
        assert_eq!(recorded.lock().unwrap().plays, vec![Cue::Siren]);
    }

    #[tokio::test]
    async fn failed_snapshot_leaves_feed_empty_with_notice() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "1", "Accident", "Open");
        store.fail_next_lists(1);

        let feed = LiveFeed::mount(store.clone(), fast_policy(None), None);
        let mut rx = feed.state();
        let state = wait_until(&mut rx, |s| s.status == FeedStatus::Live).await;
        assert!(state.set.is_empty());
        assert!(state.notice.is_some());

        store
            .create(
                Collection::Cases,
                &serde_json::json!({"id": "2", "title": "Robbery", "status": "Open"}),
            )
            .await
            .unwrap();
        let state = wait_until(&mut rx, |s| s.set.contains("2")).await;
        assert_eq!(state.set.ids(), vec!["2"]);

        feed.teardown().await;
    }

    /// Creates a case right after the first snapshot is read, before the
    /// feed has seen the snapshot.
    struct LateWriteStore {
        inner: MemoryStore,
        written: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl RecordStore for LateWriteStore {
        async fn list_full(
            &self,
            collection: Collection,
            options: &patrol_desk_store_models::ListOptions,
        ) -> Result<Vec<serde_json::Value>, StoreError> {
            let records = self.inner.list_full(collection, options).await?;
            if !self.written.swap(true, std::sync::atomic::Ordering::SeqCst) {
                self.inner
                    .create(
                        Collection::Cases,
                        &serde_json::json!({"id": "late", "title": "Robbery", "status": "Open"}),
                    )
                    .await?;
            }
            Ok(records)
        }

        async fn get(
            &self,
            collection: Collection,
            id: &str,
            expand: &[String],
        ) -> Result<serde_json::Value, StoreError> {
            self.inner.get(collection, id, expand).await
        }

        async fn create(
            &self,
            collection: Collection,
            body: &serde_json::Value,
        ) -> Result<serde_json::Value, StoreError> {
            self.inner.create(collection, body).await
        }

        async fn update(
            &self,
            collection: Collection,
            id: &str,
            body: &serde_json::Value,
        ) -> Result<serde_json::Value, StoreError> {
            self.inner.update(collection, id, body).await
        }

        async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
            self.inner.delete(collection, id).await
        }

        async fn subscribe(
            &self,
            collection: Collection,
            topic: Topic,
        ) -> Result<Subscription, StoreError> {
            self.inner.subscribe(collection, topic).await
        }
    }

    #[tokio::test]
    async fn changes_during_initial_snapshot_are_not_lost() {
        let inner = MemoryStore::new();
        seed(&inner, "1", "Accident", "Open");
        let store = Arc::new(LateWriteStore {
            inner,
            written: std::sync::atomic::AtomicBool::new(false),
        });

        let feed = LiveFeed::mount(store.clone(), fast_policy(None), None);
        let mut rx = feed.state();
        let state = wait_until(&mut rx, |s| {
            s.status == FeedStatus::Live && s.set.contains("late")
        })
        .await;
        assert_eq!(state.set.ids(), vec!["1", "late"]);
        assert_eq!(store.inner.subscribe_count(), 1);

        feed.teardown().await;
    }

    #[tokio::test]
    async fn malformed_events_do_not_disturb_the_feed() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "1", "Accident", "Open");

        let feed = LiveFeed::mount(store.clone(), fast_policy(None), None);
        let mut rx = feed.state();
        wait_until(&mut rx, |s| s.status == FeedStatus::Live).await;

        store.emit(
            Collection::Cases,
            RecordEvent {
                action: patrol_desk_store_models::RecordAction::Update,
                record: serde_json::json!({"title": "no id"}),
            },
        );
        store
            .create(
                Collection::Cases,
                &serde_json::json!({"id": "2", "title": "Noise", "status": "Open"}),
            )
            .await
            .unwrap();

        let state = wait_until(&mut rx, |s| s.set.contains("2")).await;
        assert_eq!(state.set.ids(), vec!["1", "2"]);
        assert_eq!(state.status, FeedStatus::Live);

        feed.teardown().await;
    }

    #[tokio::test]
    async fn reconnect_replaces_set_with_fresh_snapshot() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "1", "Accident", "Open");

        let feed = LiveFeed::mount(store.clone(), fast_policy(None), None);
        let mut rx = feed.state();
        wait_until(&mut rx, |s| s.status == FeedStatus::Live).await;

        seed(&store, "3", "Missed while offline", "Open");
        store.disconnect_all("connection reset");

        let state = wait_until(&mut rx, |s| {
            s.status == FeedStatus::Live && s.set.contains("3")
        })
        .await;
        assert_eq!(state.set.len(), 2);
        assert_eq!(store.subscribe_count(), 2);

        feed.teardown().await;
        assert_eq!(store.release_count(), 2);
    }

    #[tokio::test]
    async fn subscription_errors_keep_the_last_known_set() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "1", "Accident", "Open");

        let feed = LiveFeed::mount(store.clone(), fast_policy(Some(2)), None);
        let mut rx = feed.state();
        wait_until(&mut rx, |s| s.status == FeedStatus::Live).await;

        store.fail_next_lists(10);
        store.disconnect_all("connection reset");

        let state = wait_until(&mut rx, |s| s.status == FeedStatus::GaveUp).await;
        assert_eq!(state.set.ids(), vec!["1"]);
        assert_eq!(store.subscribe_count(), 3);
        assert_eq!(store.release_count(), 3);
        assert_eq!(store.active_subscriptions(), 0);

        feed.teardown().await;
    }

    #[tokio::test]
    async fn failed_subscribe_is_retried() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "1", "Accident", "Open");
        store.fail_next_subscribes(2);

        let feed = LiveFeed::mount(store.clone(), fast_policy(None), None);
        let mut rx = feed.state();
        let state = wait_until(&mut rx, |s| s.status == FeedStatus::Live).await;
        assert_eq!(state.set.ids(), vec!["1"]);
        assert_eq!(store.active_subscriptions(), 1);

        feed.teardown().await;
        assert_eq!(store.release_count(), 1);
    }

    #[tokio::test]
    async fn dropping_the_feed_releases_the_subscription() {
        let store = Arc::new(MemoryStore::new());
        let feed = LiveFeed::mount(store.clone(), fast_policy(None), None);
        let mut rx = feed.state();
        wait_until(&mut rx, |s| s.status == FeedStatus::Live).await;

        drop(feed);
        for _ in 0..100 {
            if store.release_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.release_count(), 1);
        assert_eq!(store.active_subscriptions(), 0);
    }
}
