/// Watcher settings, persisted as JSON in the platform config directory
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::media::poller::{
    PollerSettings, DEFAULT_MAX_SAME_STATE, DEFAULT_POLL_INTERVAL, DEFAULT_STOP_TIMEOUT,
};

const CONFIG_FILE: &str = "config.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    // === Polling ===
    /// Time between two samples of a session (milliseconds)
    pub poll_interval_ms: u64,

    /// Identical phases in a row before a poll gives up
    pub max_same_state: u32,

    /// How long stopping a poll may block (milliseconds)
    pub stop_timeout_ms: u64,

    // === Logging ===
    /// Also write a daily log file next to the config
    pub log_to_file: bool,

    /// Default filter when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_same_state: DEFAULT_MAX_SAME_STATE,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT.as_millis() as u64,

            log_to_file: false,
            log_filter: "info".to_string(),
        }
    }
}

impl WatcherConfig {
    pub fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "nowplaying")
    }

    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Self::project_dirs()
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Directory for log files
    pub fn log_dir() -> Result<PathBuf, ConfigError> {
        Self::project_dirs()
            .map(|dirs| dirs.data_local_dir().join("logs"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Strict load: missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is missing
    /// or unusable.
    pub fn load_or_default(path: &Path) -> Self {
        let (config, error) = Self::load_with_fallback(path);
        if let Some(e) = error {
            tracing::warn!("[Config] {}, using defaults", e);
        }
        config
    }

    /// Like [`load_or_default`](Self::load_or_default), but hands the load
    /// error back instead of logging it. For callers that read settings
    /// before logging is up.
    pub fn load_with_fallback(path: &Path) -> (Self, Option<ConfigError>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.max_same_state == 0 {
            return Err(ConfigError::Invalid {
                field: "max_same_state",
                reason: "must be at least 1",
            });
        }
        if self.stop_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "stop_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_same_state: self.max_same_state,
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}
