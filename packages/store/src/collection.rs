//! Typed access to a single collection.
//!
//! Station, publication, suggestion, and violation pages all share the same
//! list / create / edit / delete shape, so they go through one generic
//! [`CollectionClient`] keyed by the [`Resource`] impl of their model type.

use std::marker::PhantomData;

use patrol_desk_case_models::Incident;
use patrol_desk_case_models::resources::{
    PoliceStation, Publication, Suggestion, TrafficViolation,
};
use patrol_desk_store_models::{Collection, ListOptions, Topic};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{RecordStore, StoreError, Subscription};

/// A model type stored in a known collection.
pub trait Resource: DeserializeOwned + Send {
    /// Collection the records live in.
    const COLLECTION: Collection;
}

impl Resource for Incident {
    const COLLECTION: Collection = Collection::Cases;
}

impl Resource for TrafficViolation {
    const COLLECTION: Collection = Collection::TrafficViolations;
}

impl Resource for PoliceStation {
    const COLLECTION: Collection = Collection::Contacts;
}

impl Resource for Publication {
    const COLLECTION: Collection = Collection::News;
}

impl Resource for Suggestion {
    const COLLECTION: Collection = Collection::Comments;
}

/// Typed wrapper over a [`RecordStore`] for one [`Resource`].
pub struct CollectionClient<'a, T> {
    store: &'a dyn RecordStore,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Resource> CollectionClient<'a, T> {
    /// Wraps `store`.
    #[must_use]
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Lists every record matching `options`.
    ///
    /// Records that fail to decode are skipped with a warning rather than
    /// failing the whole listing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the list request fails.
    pub async fn list(&self, options: &ListOptions) -> Result<Vec<T>, StoreError> {
        let raw = self.store.list_full(T::COLLECTION, options).await?;
        let total = raw.len();
        let records: Vec<T> = raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<T>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping malformed {} record: {e}", T::COLLECTION);
                    None
                }
            })
            .collect();
        if records.len() < total {
            log::warn!(
                "{} of {total} {} records could not be decoded",
                total - records.len(),
                T::COLLECTION
            );
        }
        Ok(records)
    }

    /// Fetches one record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record is missing or malformed.
    pub async fn get(&self, id: &str, expand: &[String]) -> Result<T, StoreError> {
        let raw = self.store.get(T::COLLECTION, id, expand).await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Creates a record from any serializable body.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store rejects the record.
    pub async fn create(&self, body: &impl Serialize) -> Result<T, StoreError> {
        let body = serde_json::to_value(body)?;
        let raw = self.store.create(T::COLLECTION, &body).await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record is missing or the update is
    /// rejected.
    pub async fn update(&self, id: &str, body: &impl Serialize) -> Result<T, StoreError> {
        let body = serde_json::to_value(body)?;
        let raw = self.store.update(T::COLLECTION, id, &body).await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Deletes a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record is missing.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(T::COLLECTION, id).await
    }

    /// Subscribes to every change in the collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the subscription cannot be opened.
    pub async fn subscribe_all(&self) -> Result<Subscription, StoreError> {
        self.store.subscribe(T::COLLECTION, Topic::All).await
    }
}

#[cfg(test)]
mod tests {
    use patrol_desk_case_models::resources::NewTrafficViolation;

    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn crud_round_trip_through_memory_store() {
        let store = MemoryStore::new();
        let violations = CollectionClient::<TrafficViolation>::new(&store);

        let created = violations
            .create(&NewTrafficViolation {
                licence_number: "AAB 1234".to_string(),
                is_sorted: false,
            })
            .await
            .unwrap();
        assert!(!created.id.is_empty());
        assert!(created.created.is_some());

        let updated = violations
            .update(&created.id, &serde_json::json!({"isSorted": true}))
            .await
            .unwrap();
        assert!(updated.is_sorted);

        let listed = violations.list(&ListOptions::default()).await.unwrap();
        assert_eq!(listed.len(), 1);

        violations.delete(&created.id).await.unwrap();
        assert!(matches!(
            violations.get(&created.id, &[]).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_skips_malformed_records() {
        let store = MemoryStore::new();
        store.insert_raw(
            Collection::Cases,
            serde_json::json!({"id": "1", "title": "ok", "status": "Open"}),
        );
        store.insert_raw(Collection::Cases, serde_json::json!({"id": "2", "title": "no status"}));

        let cases = CollectionClient::<Incident>::new(&store)
            .list(&ListOptions::default())
            .await
            .unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "1");
    }
}
