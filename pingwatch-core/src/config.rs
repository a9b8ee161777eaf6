//! Static monitor configuration
//!
//! Loaded once at startup from YAML and treated as an immutable snapshot.
//! Every component receives the parts it needs at construction.

use crate::error::ConfigError;
use crate::model::Host;
use crate::stats::SeverityBuckets;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "PINGWATCH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "pingwatch.yaml";

/// Upper bounds keeping every derived window representable (ten years)
const MAX_RETENTION_MINUTES: u64 = 10 * 365 * 24 * 60;
const MAX_RETENTION_HOURS: u64 = 10 * 365 * 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Monitored hosts, in display order. The first one drives the tray status.
    pub hosts: Vec<Host>,
    pub probe_interval_ms: u64,
    pub deviation_threshold_ms: f64,
    pub display_retention_minutes: u64,
    pub unreachable_is_deviation: bool,
    pub severity: SeverityBuckets,
    pub deviation_log: DeviationLogConfig,
    /// Bounded result channel size; defaults to four slots per host
    pub result_channel_capacity: Option<usize>,
    /// Concurrent probe limit; defaults to two per host
    pub max_in_flight_probes: Option<usize>,
    pub warmup: bool,
    pub status_window: usize,
    pub status_degraded_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviationLogConfig {
    pub path: PathBuf,
    pub retention_hours: u64,
    pub max_write_attempts: u32,
    pub retry_backoff_ms: u64,
    pub prune_interval_minutes: u64,
    pub queue_capacity: usize,
}

impl Default for DeviationLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("deviations.txt"),
            retention_hours: 24,
            max_write_attempts: 3,
            retry_backoff_ms: 50,
            prune_interval_minutes: 60,
            queue_capacity: 256,
        }
    }
}

impl DeviationLogConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_minutes.max(1).saturating_mul(60))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            hosts: vec![
                Host::new("cloudflare.com", "1.1.1.1"),
                Host::new("google.com", "8.8.8.8"),
                Host::new("seznam.cz", "77.75.77.222"),
            ],
            probe_interval_ms: 1000,
            deviation_threshold_ms: 60.0,
            display_retention_minutes: 10,
            unreachable_is_deviation: true,
            severity: SeverityBuckets::default(),
            deviation_log: DeviationLogConfig::default(),
            result_channel_capacity: None,
            max_in_flight_probes: None,
            warmup: true,
            status_window: 10,
            status_degraded_ratio: 0.3,
        }
    }
}

impl MonitorConfig {
    /// Config path from `PINGWATCH_CONFIG`, falling back to `pingwatch.yaml`
    pub fn resolve_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load and validate. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("no config at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }

        let mut seen = HashSet::new();
        for (index, host) in self.hosts.iter().enumerate() {
            if host.name.trim().is_empty() {
                return Err(ConfigError::EmptyHostField { index, field: "name" });
            }
            if host.address.trim().is_empty() {
                return Err(ConfigError::EmptyHostField { index, field: "address" });
            }
            if host.name.chars().any(char::is_control) {
                return Err(invalid("hosts.name", "must not contain control characters"));
            }
            if host.address.chars().any(char::is_control) {
                return Err(invalid("hosts.address", "must not contain control characters"));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(ConfigError::DuplicateHost(host.name.clone()));
            }
        }

        if self.probe_interval_ms == 0 {
            return Err(invalid("probe_interval_ms", "must be greater than zero"));
        }
        if !self.deviation_threshold_ms.is_finite() || self.deviation_threshold_ms < 0.0 {
            return Err(invalid("deviation_threshold_ms", "must be a non-negative number"));
        }
        if self.display_retention_minutes == 0 || self.display_retention_minutes > MAX_RETENTION_MINUTES {
            return Err(invalid("display_retention_minutes", "must be between 1 and ten years"));
        }
        if self.severity.good_below_ms > self.severity.bad_above_ms {
            return Err(invalid("severity", "good_below_ms must not exceed bad_above_ms"));
        }
        if self.deviation_log.retention_hours == 0 || self.deviation_log.retention_hours > MAX_RETENTION_HOURS {
            return Err(invalid("deviation_log.retention_hours", "must be between 1 and ten years"));
        }
        if self.deviation_log.prune_interval_minutes == 0
            || self.deviation_log.prune_interval_minutes > MAX_RETENTION_MINUTES
        {
            return Err(invalid("deviation_log.prune_interval_minutes", "must be between 1 and ten years"));
        }
        if self.deviation_log.max_write_attempts == 0 {
            return Err(invalid("deviation_log.max_write_attempts", "must be at least 1"));
        }
        if self.deviation_log.queue_capacity == 0 {
            return Err(invalid("deviation_log.queue_capacity", "must be at least 1"));
        }
        if self.result_channel_capacity == Some(0) {
            return Err(invalid("result_channel_capacity", "must be at least 1"));
        }
        if self.max_in_flight_probes == Some(0) {
            return Err(invalid("max_in_flight_probes", "must be at least 1"));
        }
        if self.status_window == 0 {
            return Err(invalid("status_window", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.status_degraded_ratio) {
            return Err(invalid("status_degraded_ratio", "must be within 0.0..=1.0"));
        }
        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn display_retention(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.display_retention_minutes as i64)
    }

    /// Samples kept per host: retention / interval, rounded, at least one
    pub fn history_capacity(&self) -> usize {
        let retention_ms = self.display_retention_minutes as f64 * 60_000.0;
        let count = (retention_ms / self.probe_interval_ms as f64).round() as usize;
        count.max(1)
    }

    pub fn channel_capacity(&self) -> usize {
        self.result_channel_capacity
            .unwrap_or(self.hosts.len() * 4)
            .max(1)
    }

    pub fn in_flight_limit(&self) -> usize {
        self.max_in_flight_probes
            .unwrap_or(self.hosts.len() * 2)
            .max(1)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
