//! Console configuration.
//!
//! Read from the TOML file named by `PATROL_DESK_CONFIG` when set, then
//! overridden by the `PATROL_DESK_*` environment variables:
//!
//! ```toml
//! [store]
//! url = "https://desk.example.org"
//! identity = "operator@example.org"
//!
//! [feed]
//! alerts = "bell"
//!
//! [feed.reconnect]
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! max_attempts = 20
//! ```

use std::path::Path;

use patrol_desk_feed::ReconnectPolicy;
use patrol_desk_store::{StoreConfig, StoreError};
use serde::Deserialize;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PATROL_DESK_CONFIG";

/// Errors loading the console configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
    /// The resulting settings are unusable.
    #[error(transparent)]
    Invalid(#[from] StoreError),
}

/// How new-incident cues are played.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMode {
    /// Ring the terminal bell.
    #[default]
    Bell,
    /// Log only.
    Log,
    /// No cues.
    Off,
}

/// `[feed]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Backoff between reconnect attempts.
    pub reconnect: ReconnectPolicy,
    /// Cue playback.
    pub alerts: AlertMode,
}

/// Whole console configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// Record store connection.
    pub store: StoreConfig,
    /// Live feed behaviour.
    pub feed: FeedConfig,
}

impl DeskConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document does not match the
    /// schema.
    pub fn from_toml(source: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Reads a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_toml(&source, &display)
    }

    /// File (if any) plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or the merged
    /// settings are invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`Self::load`] with an injectable environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or the merged
    /// settings are invalid.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_ENV).filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                log::debug!("Loading configuration from {path}");
                Self::from_file(Path::new(&path))?
            }
            None => Self::default(),
        };
        config.store.apply_env(lookup);
        config.store.validate()?;
        Ok(config)
    }
}
