#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record store client for the patrol desk.
//!
//! Every consumer talks to the backend through the [`RecordStore`] trait and
//! receives it as an explicitly constructed `Arc<dyn RecordStore>`. Two
//! implementations ship here:
//!
//! - [`pocketbase::PocketBaseStore`] speaks the PocketBase REST API and its
//!   SSE realtime endpoint.
//! - [`memory::MemoryStore`] keeps collections in memory and publishes
//!   realtime events synchronously, for tests and offline demos.

pub mod cases;
pub mod collection;
pub mod config;
pub mod directory;
pub mod memory;
pub mod messenger;
pub mod pocketbase;
pub mod realtime;
pub mod retry;
pub mod subscription;

use async_trait::async_trait;
use patrol_desk_store_models::{Collection, ListOptions, Topic};

pub use collection::{CollectionClient, Resource};
pub use config::StoreConfig;
pub use subscription::Subscription;

/// Errors that can occur while talking to the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message from the response body, if any.
        message: String,
    },

    /// The requested record does not exist.
    #[error("{collection} record {id} not found")]
    NotFound {
        /// Collection searched.
        collection: Collection,
        /// Missing record ID.
        id: String,
    },

    /// The realtime connection failed or closed.
    #[error("Realtime error: {message}")]
    Realtime {
        /// Description of what went wrong.
        message: String,
    },

    /// Authentication was rejected.
    #[error("Authentication failed: {message}")]
    Auth {
        /// Description of what went wrong.
        message: String,
    },

    /// The request cannot be made with the data at hand.
    #[error("Invalid request: {message}")]
    Invalid {
        /// Description of what is missing or wrong.
        message: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}

/// A backend-as-a-service record store.
///
/// Records travel as raw JSON; use [`CollectionClient`] for typed access.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetches every record matching `options`, paging until exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any page request fails.
    async fn list_full(
        &self,
        collection: Collection,
        options: &ListOptions,
    ) -> Result<Vec<serde_json::Value>, StoreError>;

    /// Fetches a single record, expanding the given relations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such record exists.
    async fn get(
        &self,
        collection: Collection,
        id: &str,
        expand: &[String],
    ) -> Result<serde_json::Value, StoreError>;

    /// Creates a record and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store rejects the record.
    async fn create(
        &self,
        collection: Collection,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, StoreError>;

    /// Applies a partial update and returns the full updated record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such record exists.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, StoreError>;

    /// Deletes a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such record exists.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    /// Opens a realtime subscription. The returned [`Subscription`] must be
    /// released (explicitly or by dropping it) when the consumer goes away.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the subscription cannot be established.
    async fn subscribe(
        &self,
        collection: Collection,
        topic: Topic,
    ) -> Result<Subscription, StoreError>;
}
