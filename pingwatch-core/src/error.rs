//! Error taxonomy for the monitoring pipeline
//!
//! Probe failures are not errors: they travel through the pipeline as
//! failure-marked samples. Only configuration problems are fatal, and only
//! at startup.

use std::path::PathBuf;

/// Invalid or unreadable startup configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no hosts configured")]
    NoHosts,
    #[error("duplicate host name: {0}")]
    DuplicateHost(String),
    #[error("host entry {index} has an empty {field}")]
    EmptyHostField { index: usize, field: &'static str },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Durable deviation log append that could not be completed
#[derive(Debug, thiserror::Error)]
pub enum LogWriteError {
    #[error("deviation log write failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("deviation log prune failed: {0}")]
    Prune(#[source] std::io::Error),
    #[error("deviation queue full, record for {host} dropped")]
    QueueFull { host: String },
}

/// Runtime settings persistence failures
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings version conflict: expected {expected}, current {current}")]
    VersionConflict { expected: u64, current: u64 },
    #[error("could not find a config directory for settings")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings decode error: {0}")]
    Decode(#[from] toml::de::Error),
    #[error("settings encode error: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Startup failures of the monitor as a whole
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}
