//! Configuration management for threaded source drivers.

use crate::{SourceError, SourceResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Stats instance used when the worker does not name one
pub const DEFAULT_STATS_INSTANCE: &str = "LogThreadedSource";

/// Main configuration for a threaded source driver
///
/// # Structure
/// - **Mandatory fields**: `id` (from `SOURCE_ID` when loaded from the environment)
/// - **Optional fields** (from config file or defaults): `group`, `reopen`, `fetch`,
///   `persist_file`, `log_level`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Driver id, unique within its group
    pub id: String,

    /// Group label, part of the synthesized persistence name
    #[serde(default = "default_group")]
    pub group: String,

    /// Reopen-after-failure settings
    #[serde(default)]
    pub reopen: ReopenSettings,

    /// Fetch loop and flow control settings
    #[serde(default)]
    pub fetch: FetchSettings,

    /// File backing the persisted position store
    ///
    /// A position-tracked driver needs either this or a store passed to
    /// `SourceDriverBuilder::persist_state`; with neither, spawning fails.
    #[serde(default)]
    pub persist_file: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl SourceConfig {
    /// Create a configuration with defaults for everything but the id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Load mandatory configuration from environment variables
    ///
    /// - `SOURCE_ID`: driver id (required)
    /// - `SOURCE_GROUP`: group label (optional)
    pub fn from_env() -> SourceResult<Self> {
        let id = env::var("SOURCE_ID").map_err(|_| SourceError::config("SOURCE_ID is required"))?;

        let mut config = Self::new(id);
        if let Ok(group) = env::var("SOURCE_GROUP") {
            config.group = group;
        }
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> SourceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SourceError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            SourceError::config(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Apply environment variable overrides to the identity fields only
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SOURCE_ID") {
            self.id = val;
        }
        if let Ok(val) = env::var("SOURCE_GROUP") {
            self.group = val;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> SourceResult<()> {
        if self.id.is_empty() {
            return Err(SourceError::config("id cannot be empty"));
        }

        if self.reopen.time_reopen_secs == 0 {
            return Err(SourceError::config("time_reopen_secs must be > 0"));
        }

        if self.fetch.fetch_limit == 0 {
            return Err(SourceError::config("fetch_limit must be > 0"));
        }

        if self.fetch.init_window_size == 0 {
            return Err(SourceError::config("init_window_size must be > 0"));
        }

        if self.fetch.follow_freq_ms == Some(0) {
            return Err(SourceError::config("follow_freq_ms must be > 0 when set"));
        }

        Ok(())
    }

    /// Persistence name used when the worker does not supply one
    pub fn default_persist_name(&self) -> String {
        format!("{}:{}:{}", self.group, self.id, DEFAULT_STATS_INSTANCE)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            id: "default-source".to_string(),
            group: default_group(),
            reopen: ReopenSettings::default(),
            fetch: FetchSettings::default(),
            persist_file: None,
            log_level: default_log_level(),
        }
    }
}

fn default_group() -> String {
    "default".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Reopen-after-failure settings
///
/// The delay is fixed; there is no backoff between attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReopenSettings {
    /// Seconds to wait before opening the source again
    #[serde(default = "default_time_reopen_secs")]
    pub time_reopen_secs: u64,
}

impl ReopenSettings {
    pub fn time_reopen(&self) -> Duration {
        Duration::from_secs(self.time_reopen_secs)
    }
}

fn default_time_reopen_secs() -> u64 {
    60
}

impl Default for ReopenSettings {
    fn default() -> Self {
        Self {
            time_reopen_secs: default_time_reopen_secs(),
        }
    }
}

/// Fetch loop and flow control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Maximum number of messages fetched per scheduling turn
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// Number of messages allowed in flight before the source suspends
    #[serde(default = "default_init_window_size")]
    pub init_window_size: usize,

    /// Period of the follow poller; no readiness watch is installed when unset
    #[serde(default)]
    pub follow_freq_ms: Option<u64>,

    /// How acknowledgements advance the persisted position
    #[serde(default)]
    pub ack_tracking: AckTracking,
}

fn default_fetch_limit() -> usize {
    10
}
fn default_init_window_size() -> usize {
    100
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            fetch_limit: default_fetch_limit(),
            init_window_size: default_init_window_size(),
            follow_freq_ms: None,
            ack_tracking: AckTracking::default(),
        }
    }
}

/// Ack tracking mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckTracking {
    /// Every acknowledged message commits its own bookmark
    #[default]
    Instant,
    /// Only the fully acknowledged prefix of the fetch order is committed
    Consecutive,
}
