//! In-memory [`RecordStore`].
//!
//! Keeps each collection as a vector of JSON records, evaluates structured
//! filters locally, and pushes realtime events to subscribers as soon as a
//! mutation happens. Also exposes fault-injection hooks (failed lists,
//! failed subscribes, dropped connections) so feed behaviour under errors
//! can be exercised without a network.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use patrol_desk_case_models::timestamp;
use patrol_desk_store_models::{
    Collection, Filter, FilterValue, ListOptions, Operator, RecordAction, RecordEvent, Topic,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::subscription::EVENT_CHANNEL_BUFFER;
use crate::{RecordStore, StoreError, Subscription};

struct Subscriber {
    id: u64,
    collection: Collection,
    topic: Topic,
    tx: mpsc::Sender<Result<RecordEvent, StoreError>>,
}

#[derive(Default)]
struct State {
    collections: BTreeMap<Collection, Vec<Value>>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    fail_lists: u32,
    fail_subscribes: u32,
    subscribes: usize,
    releases: usize,
}

/// An in-memory record store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a record without emitting a realtime event.
    pub fn insert_raw(&self, collection: Collection, record: Value) {
        self.lock()
            .collections
            .entry(collection)
            .or_default()
            .push(record);
    }

    /// Current contents of a collection, in insertion order.
    #[must_use]
    pub fn records(&self, collection: Collection) -> Vec<Value> {
        self.lock()
            .collections
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Pushes an arbitrary event to subscribers without touching stored
    /// data. Used to replay duplicates or deliver malformed payloads.
    pub fn emit(&self, collection: Collection, event: RecordEvent) {
        let mut state = self.lock();
        publish(&mut state, collection, &event);
    }

    /// Makes the next `count` list calls fail with HTTP 503.
    pub fn fail_next_lists(&self, count: u32) {
        self.lock().fail_lists = count;
    }

    /// Makes the next `count` subscribe calls fail.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.lock().fail_subscribes = count;
    }

    /// Simulates a dropped connection: every subscriber receives an error
    /// and is detached.
    pub fn disconnect_all(&self, message: &str) {
        let subscribers = std::mem::take(&mut self.lock().subscribers);
        for sub in subscribers {
            let _ = sub.tx.try_send(Err(StoreError::Realtime {
                message: message.to_string(),
            }));
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Total successful subscribe calls.
    #[must_use]
    pub fn subscribe_count(&self) -> usize {
        self.lock().subscribes
    }

    /// Total subscription releases.
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.lock().releases
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_full(
        &self,
        collection: Collection,
        options: &ListOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let mut state = self.lock();
        if state.fail_lists > 0 {
            state.fail_lists -= 1;
            return Err(StoreError::Status {
                status: 503,
                message: "injected list failure".to_string(),
            });
        }

        let mut records: Vec<Value> = state
            .collections
            .get(&collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| options.filter.as_ref().is_none_or(|f| matches(f, r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(state);

        records.sort_by(|a, b| {
            options
                .sort
                .iter()
                .map(|sort| {
                    let ord = compare_json(&a[sort.field.as_ref()], &b[sort.field.as_ref()]);
                    if sort.descending { ord.reverse() } else { ord }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        Ok(records)
    }

    async fn get(
        &self,
        collection: Collection,
        id: &str,
        _expand: &[String],
    ) -> Result<Value, StoreError> {
        self.lock()
            .collections
            .get(&collection)
            .and_then(|records| records.iter().find(|r| record_id(r) == Some(id)))
            .cloned()
            .ok_or_else(|| not_found(collection, id))
    }

    async fn create(&self, collection: Collection, body: &Value) -> Result<Value, StoreError> {
        let Value::Object(mut record) = body.clone() else {
            return Err(StoreError::Status {
                status: 400,
                message: "record body must be an object".to_string(),
            });
        };

        let id = record
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map_or_else(new_id, String::from);
        let now = Value::String(timestamp::format(&Utc::now()));
        record.insert("id".to_string(), Value::String(id));
        record.insert("collectionName".to_string(), Value::String(collection.to_string()));
        record.insert("created".to_string(), now.clone());
        record.insert("updated".to_string(), now);
        let record = Value::Object(record);

        let mut state = self.lock();
        state
            .collections
            .entry(collection)
            .or_default()
            .push(record.clone());
        publish(
            &mut state,
            collection,
            &RecordEvent {
                action: RecordAction::Create,
                record: record.clone(),
            },
        );

        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: &Value,
    ) -> Result<Value, StoreError> {
        let mut state = self.lock();
        let record = state
            .collections
            .get_mut(&collection)
            .and_then(|records| records.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or_else(|| not_found(collection, id))?;

        if let (Value::Object(target), Value::Object(changes)) = (&mut *record, body) {
            for (key, value) in changes {
                if key != "id" {
                    target.insert(key.clone(), value.clone());
                }
            }
            target.insert(
                "updated".to_string(),
                Value::String(timestamp::format(&Utc::now())),
            );
        }
        let updated = record.clone();

        publish(
            &mut state,
            collection,
            &RecordEvent {
                action: RecordAction::Update,
                record: updated.clone(),
            },
        );

        Ok(updated)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let records = state
            .collections
            .get_mut(&collection)
            .ok_or_else(|| not_found(collection, id))?;
        let index = records
            .iter()
            .position(|r| record_id(r) == Some(id))
            .ok_or_else(|| not_found(collection, id))?;
        let removed = records.remove(index);

        publish(
            &mut state,
            collection,
            &RecordEvent {
                action: RecordAction::Delete,
                record: removed,
            },
        );

        Ok(())
    }

    async fn subscribe(
        &self,
        collection: Collection,
        topic: Topic,
    ) -> Result<Subscription, StoreError> {
        let mut state = self.lock();
        if state.fail_subscribes > 0 {
            state.fail_subscribes -= 1;
            return Err(StoreError::Realtime {
                message: "injected subscribe failure".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribes += 1;
        let key = topic.key(collection);
        state.subscribers.push(Subscriber {
            id,
            collection,
            topic,
            tx,
        });
        drop(state);

        let shared = Arc::clone(&self.state);
        Ok(Subscription::new(key, rx, move || {
            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            state.subscribers.retain(|s| s.id != id);
            state.releases += 1;
        }))
    }
}

fn publish(state: &mut State, collection: Collection, event: &RecordEvent) {
    let event_id = record_id(&event.record).map(String::from);
    state.subscribers.retain(|sub| {
        if sub.collection != collection {
            return true;
        }
        let wanted = match &sub.topic {
            Topic::All => true,
            Topic::Record(id) => event_id.as_deref() == Some(id.as_str()),
        };
        if !wanted {
            return true;
        }
        match sub.tx.try_send(Ok(event.clone())) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Subscriber {} is lagging, event dropped", sub.id);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    });
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn not_found(collection: Collection, id: &str) -> StoreError {
    StoreError::NotFound {
        collection,
        id: id.to_string(),
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..15].to_string()
}

/// Evaluates a structured filter against a JSON record.
fn matches(filter: &Filter, record: &Value) -> bool {
    match filter {
        Filter::Condition { field, op, value } => {
            let actual = record.get(field.as_ref()).unwrap_or(&Value::Null);
            evaluate(actual, *op, value)
        }
        Filter::And(children) => children.iter().all(|c| matches(c, record)),
        Filter::Or(children) => children.is_empty() || children.iter().any(|c| matches(c, record)),
    }
}

fn evaluate(actual: &Value, op: Operator, expected: &FilterValue) -> bool {
    match op {
        Operator::Like | Operator::NotLike => {
            let haystack = json_text(actual).to_lowercase();
            let needle = match expected {
                FilterValue::Text(text) => text.to_lowercase(),
                other => filter_text(other),
            };
            haystack.contains(&needle) == matches!(op, Operator::Like)
        }
        Operator::Eq => compare_value(actual, expected) == Some(Ordering::Equal),
        Operator::Ne => compare_value(actual, expected) != Some(Ordering::Equal),
        Operator::Gt => compare_value(actual, expected) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            compare_value(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lt => compare_value(actual, expected) == Some(Ordering::Less),
        Operator::Lte => matches!(
            compare_value(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

fn compare_value(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    match expected {
        FilterValue::Text(text) => Some(json_text(actual).as_str().cmp(text.as_str())),
        FilterValue::Bool(b) => Some(actual.as_bool().unwrap_or(false).cmp(b)),
        FilterValue::Number(n) => actual.as_f64().and_then(|a| a.partial_cmp(n)),
        FilterValue::Timestamp(dt) => actual
            .as_str()
            .and_then(timestamp::parse)
            .map(|a| a.cmp(dt)),
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn filter_text(value: &FilterValue) -> String {
    match value {
        FilterValue::Text(text) => text.clone(),
        FilterValue::Bool(b) => b.to_string(),
        FilterValue::Number(n) => n.to_string(),
        FilterValue::Timestamp(dt) => timestamp::format(dt),
    }
}

fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => json_text(a).cmp(&json_text(b)),
    }
}

#[cfg(test)]
mod tests {
    use patrol_desk_store_models::{Field, Sort};

    use super::*;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, title, status, created) in [
            ("1", "Accident on Main St", "Open", "2024-05-01 08:00:00.000Z"),
            ("2", "Robbery at market", "Resolved", "2024-05-02 08:00:00.000Z"),
            ("3", "SOS Alert", "Ongoing", "2024-05-03 08:00:00.000Z"),
            ("4", "Noise complaint", "Cancelled", "2024-05-04 08:00:00.000Z"),
        ] {
            store.insert_raw(
                Collection::Cases,
                serde_json::json!({"id": id, "title": title, "status": status, "created": created}),
            );
        }
        store
    }

    fn ids(records: &[Value]) -> Vec<&str> {
        records.iter().filter_map(record_id).collect()
    }

    #[tokio::test]
    async fn filters_and_sorts() {
        let store = seeded();
        let options = ListOptions::default()
            .filter(
                Filter::ne(Field::Status, "Resolved").and(Filter::ne(Field::Status, "Cancelled")),
            )
            .sort(Sort::desc(Field::Created));
        let records = store.list_full(Collection::Cases, &options).await.unwrap();
        assert_eq!(ids(&records), vec!["3", "1"]);
    }

    #[tokio::test]
    async fn like_is_case_insensitive() {
        let store = seeded();
        let options = ListOptions::default().filter(Filter::like(Field::Title, "ROBBERY"));
        let records = store.list_full(Collection::Cases, &options).await.unwrap();
        assert_eq!(ids(&records), vec!["2"]);
    }

    #[tokio::test]
    async fn timestamp_range() {
        let store = seeded();
        let start = timestamp::parse("2024-05-02 00:00:00.000Z").unwrap();
        let end = timestamp::parse("2024-05-03 23:59:59.000Z").unwrap();
        let options = ListOptions::default().filter(
            Filter::gte(Field::Created, start).and(Filter::lte(Field::Created, end)),
        );
        let records = store.list_full(Collection::Cases, &options).await.unwrap();
        assert_eq!(ids(&records), vec!["2", "3"]);
    }

    #[tokio::test]
    async fn mutations_reach_subscribers() {
        let store = MemoryStore::new();
        let mut sub = store
            .subscribe(Collection::Cases, Topic::All)
            .await
            .unwrap();

        let created = store
            .create(
                Collection::Cases,
                &serde_json::json!({"title": "SOS", "status": "Open"}),
            )
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        store
            .update(Collection::Cases, &id, &serde_json::json!({"status": "Resolved"}))
            .await
            .unwrap();
        store.delete(Collection::Cases, &id).await.unwrap();

        let actions: Vec<RecordAction> = [
            sub.next().await.unwrap().unwrap(),
            sub.next().await.unwrap().unwrap(),
            sub.next().await.unwrap().unwrap(),
        ]
        .iter()
        .map(|e| e.action)
        .collect();
        assert_eq!(
            actions,
            vec![RecordAction::Create, RecordAction::Update, RecordAction::Delete]
        );
    }

    #[tokio::test]
    async fn other_collections_are_not_delivered() {
        let store = MemoryStore::new();
        let mut sub = store
            .subscribe(Collection::Cases, Topic::All)
            .await
            .unwrap();
        store
            .create(Collection::News, &serde_json::json!({"title": "Notice"}))
            .await
            .unwrap();
        store.disconnect_all("bye");
        assert!(sub.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn release_detaches_subscriber() {
        let store = MemoryStore::new();
        let sub = store
            .subscribe(Collection::Cases, Topic::All)
            .await
            .unwrap();
        assert_eq!(store.active_subscriptions(), 1);
        sub.unsubscribe();
        assert_eq!(store.active_subscriptions(), 0);
        assert_eq!(store.release_count(), 1);
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = seeded();
        store.fail_next_lists(1);
        assert!(
            store
                .list_full(Collection::Cases, &ListOptions::default())
                .await
                .is_err()
        );
        assert!(
            store
                .list_full(Collection::Cases, &ListOptions::default())
                .await
                .is_ok()
        );

        store.fail_next_subscribes(1);
        assert!(store.subscribe(Collection::Cases, Topic::All).await.is_err());
    }
}
