//! Client configuration: which game to join and where it lives.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Environment variable overriding the game id.
pub const ENV_GAME_ID: &str = "CASTLE_GAME_ID";
/// Environment variable pointing the client at a remote store.
pub const ENV_STORE_URL: &str = "CASTLE_STORE_URL";
/// Environment variable pointing the client at a SQLite file.
pub const ENV_DB_PATH: &str = "CASTLE_DB_PATH";

/// Backend holding the shared game document.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreKind {
    /// In-process store; only useful for tests and demos.
    Memory,
    /// Local SQLite file shared between processes.
    Sqlite,
    /// HTTP document server started with `serve`.
    #[default]
    Remote,
    /// No store at all.
    Offline,
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Key of the shared game document.
    #[serde(default = "default_game_id")]
    game_id: String,

    /// Which backend to use.
    #[serde(default)]
    store: StoreKind,

    /// Base URL of the document server.
    #[serde(default = "default_store_url")]
    store_url: String,

    /// SQLite file for the `sqlite` store.
    #[serde(default = "default_db_path")]
    db_path: String,

    /// How often polling subscriptions check for changes.
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
}

#[instrument]
fn default_game_id() -> String {
    "mainCastleGame".to_string()
}

#[instrument]
fn default_store_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

#[instrument]
fn default_db_path() -> String {
    "castle_chess.db".to_string()
}

#[instrument]
fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            game_id: default_game_id(),
            store: StoreKind::default(),
            store_url: default_store_url(),
            db_path: default_db_path(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        info!(game_id = %config.game_id, store = %config.store, "Config loaded successfully");
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise starts from defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            debug!("No config file; using defaults");
            Ok(Self::default())
        }
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`.
    ///
    /// A store URL selects the remote store and a database path selects
    /// SQLite; when both are set the URL wins.
    #[instrument(skip(self, lookup))]
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(game_id) = lookup(ENV_GAME_ID) {
            debug!(game_id = %game_id, "Game id from environment");
            self.game_id = game_id;
        }
        if let Some(db_path) = lookup(ENV_DB_PATH) {
            debug!(db_path = %db_path, "Database path from environment");
            self.db_path = db_path;
            self.store = StoreKind::Sqlite;
        }
        if let Some(url) = lookup(ENV_STORE_URL) {
            debug!(url = %url, "Store URL from environment");
            self.store_url = url;
            self.store = StoreKind::Remote;
        }
        self.validate()?;
        Ok(self)
    }

    /// Switches to the remote store at `url`.
    pub fn with_store_url(mut self, url: String) -> Self {
        self.store_url = url;
        self.store = StoreKind::Remote;
        self
    }

    /// Replaces the backend.
    pub fn with_store(mut self, store: StoreKind) -> Self {
        self.store = store;
        self
    }

    /// Replaces the game id.
    pub fn with_game_id(mut self, game_id: String) -> Self {
        self.game_id = game_id;
        self
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.game_id.trim().is_empty() {
            return Err(ConfigError::new("game_id must not be empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::new(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
