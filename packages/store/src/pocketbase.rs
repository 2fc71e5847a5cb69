//! PocketBase-backed [`RecordStore`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use patrol_desk_store_models::{Collection, ListOptions, Topic};
use serde_json::Value;

use crate::{RecordStore, StoreConfig, StoreError, Subscription, realtime, retry};

/// Hard cap on pages fetched by a single [`RecordStore::list_full`] call.
const MAX_PAGES: u32 = 10_000;

/// Record store client speaking the PocketBase REST and realtime APIs.
#[derive(Clone)]
pub struct PocketBaseStore {
    client: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for PocketBaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PocketBaseStore")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token().is_some())
            .finish_non_exhaustive()
    }
}

impl PocketBaseStore {
    /// Builds a client from `config`. Does not authenticate; see
    /// [`Self::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the config is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("patrol-desk/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Builds a client and, when credentials are configured, signs in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the client cannot be built or
    /// authentication is rejected.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let store = Self::new(config)?;
        if let Some((identity, password)) = config.credentials() {
            store.authenticate(identity, password).await?;
        } else {
            log::info!("No credentials configured, using anonymous access");
        }
        Ok(store)
    }

    /// Signs in against the `users` auth collection and keeps the token
    /// for subsequent requests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Auth`] if the credentials are rejected.
    pub async fn authenticate(&self, identity: &str, password: &str) -> Result<(), StoreError> {
        let url = format!(
            "{}/api/collections/{}/auth-with-password",
            self.base_url,
            Collection::Users
        );
        let body = serde_json::json!({ "identity": identity, "password": password });

        let response = retry::send_json(|| self.client.post(&url).json(&body))
            .await
            .map_err(|e| match e {
                StoreError::Status { message, .. } => StoreError::Auth { message },
                other => other,
            })?;

        let token = response
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Auth {
                message: "auth response carried no token".to_string(),
            })?;
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        log::info!("Authenticated as {identity}");
        Ok(())
    }

    /// Current auth token, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn records_url(&self, collection: Collection) -> String {
        format!("{}/api/collections/{collection}/records", self.base_url)
    }

    fn record_url(&self, collection: Collection, id: &str) -> String {
        format!("{}/{id}", self.records_url(collection))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token() {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, token),
            None => request,
        }
    }

    fn map_not_found(collection: Collection, id: &str, e: StoreError) -> StoreError {
        match e {
            StoreError::Status { status: 404, .. } => StoreError::NotFound {
                collection,
                id: id.to_string(),
            },
            other => other,
        }
    }
}

/// Items of a single list page, and whether another page follows.
fn page_items(body: Value, per_page: u32) -> Result<(Vec<Value>, bool), StoreError> {
    let Value::Object(mut body) = body else {
        return Err(StoreError::Status {
            status: 200,
            message: "list response was not an object".to_string(),
        });
    };
    let items = match body.remove("items") {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(StoreError::Status {
                status: 200,
                message: "list response carried no items".to_string(),
            });
        }
    };
    let more = items.len() >= per_page as usize && !items.is_empty();
    Ok((items, more))
}

#[async_trait]
impl RecordStore for PocketBaseStore {
    async fn list_full(
        &self,
        collection: Collection,
        options: &ListOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let url = self.records_url(collection);
        let mut records = Vec::new();

        for page in 1..=MAX_PAGES {
            let query = options.to_query(page);
            let body = retry::send_json(|| self.authorize(self.client.get(&url).query(&query)))
                .await?;
            let (items, more) = page_items(body, options.per_page)?;
            log::debug!("{collection}: page {page} returned {} records", items.len());
            records.extend(items);
            if !more {
                return Ok(records);
            }
        }

        log::warn!("{collection}: stopped after {MAX_PAGES} pages");
        Ok(records)
    }

    async fn get(
        &self,
        collection: Collection,
        id: &str,
        expand: &[String],
    ) -> Result<Value, StoreError> {
        let url = self.record_url(collection, id);
        let query: Vec<(&str, String)> = if expand.is_empty() {
            Vec::new()
        } else {
            vec![("expand", expand.join(","))]
        };
        retry::send_json(|| self.authorize(self.client.get(&url).query(&query)))
            .await
            .map_err(|e| Self::map_not_found(collection, id, e))
    }

    async fn create(&self, collection: Collection, body: &Value) -> Result<Value, StoreError> {
        let url = self.records_url(collection);
        retry::send_json(|| self.authorize(self.client.post(&url).json(body))).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: &Value,
    ) -> Result<Value, StoreError> {
        let url = self.record_url(collection, id);
        retry::send_json(|| self.authorize(self.client.patch(&url).json(body)))
            .await
            .map_err(|e| Self::map_not_found(collection, id, e))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let url = self.record_url(collection, id);
        retry::send_empty(|| self.authorize(self.client.delete(&url)))
            .await
            .map_err(|e| Self::map_not_found(collection, id, e))
    }

    async fn subscribe(
        &self,
        collection: Collection,
        topic: Topic,
    ) -> Result<Subscription, StoreError> {
        realtime::open(
            self.client.clone(),
            &self.base_url,
            self.token(),
            topic.key(collection),
        )
        .await
    }
}
