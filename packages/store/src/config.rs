//! Record store connection settings.
//!
//! Settings come from an optional `[store]` TOML table and are then
//! overridden by environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `PATROL_DESK_URL` | `url` |
//! | `PATROL_DESK_IDENTITY` | `identity` |
//! | `PATROL_DESK_PASSWORD` | `password` |
//! | `PATROL_DESK_MESSAGE_URL` | `message_url` |

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Backend URL used when nothing else is configured.
pub const DEFAULT_URL: &str = "http://127.0.0.1:8090";

/// Per-request timeout used when nothing else is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the backend.
    pub url: String,
    /// Operator login (email or username) for password auth.
    pub identity: Option<String>,
    /// Operator password.
    pub password: Option<String>,
    /// Officer message gateway endpoint.
    pub message_url: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            identity: None,
            password: None,
            message_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the resulting URL is invalid.
    pub fn from_env() -> Result<Self, StoreError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `lookup`, which maps variable names to
    /// values. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("PATROL_DESK_URL") {
            self.url = url;
        }
        if let Some(identity) = get("PATROL_DESK_IDENTITY") {
            self.identity = Some(identity);
        }
        if let Some(password) = get("PATROL_DESK_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(message_url) = get("PATROL_DESK_MESSAGE_URL") {
            self.message_url = Some(message_url);
        }
    }

    /// Checks that the URL looks usable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL is not http(s) or the
    /// timeout is zero.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(StoreError::Config {
                message: format!("store URL must be http(s), got {:?}", self.url),
            });
        }
        if self.timeout_secs == 0 {
            return Err(StoreError::Config {
                message: "timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Identity and password, when both are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.identity.as_deref()?, self.password.as_deref()?))
    }
}
