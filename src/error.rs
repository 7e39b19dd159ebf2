/// Error types for media session reads and settings handling
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a media session provider.
///
/// None of these ever reach a consumer: the extractor turns every one of
/// them into "no snapshot this time".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    /// The session returned nothing for the requested field (metadata or
    /// playback state not published yet).
    #[error("{0} unavailable")]
    Unavailable(&'static str),

    /// The session threw while being queried.
    #[error("media session backend error: {0}")]
    Backend(String),
}

/// Error types for loading and saving `WatcherConfig`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve a config directory for this platform")]
    NoConfigDir,

    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
