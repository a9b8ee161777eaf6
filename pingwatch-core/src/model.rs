//! Core data model: monitored hosts, probe outcomes and samples

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A monitored remote host, identified by display name and address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub address: String,
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Result of a single echo exchange
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Round-trip latency in milliseconds
    Success(f64),
    /// No reply within the probe deadline
    Timeout,
    /// The probe could not be performed (resolution, permissions, missing tool...)
    Error(String),
}

impl ProbeOutcome {
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            ProbeOutcome::Success(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }
}

/// One measurement for one host, tagged with its per-host dispatch sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub host: Arc<Host>,
    pub timestamp: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    pub sequence: u64,
}

impl Sample {
    pub fn new(host: Arc<Host>, timestamp: DateTime<Utc>, outcome: ProbeOutcome, sequence: u64) -> Self {
        Self {
            host,
            timestamp,
            outcome,
            sequence,
        }
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.outcome.latency_ms()
    }

    /// True for the "unreachable" sentinel (timeout or error)
    pub fn is_failure(&self) -> bool {
        !self.outcome.is_success()
    }

    /// Human-readable line in local time, the way the history view prints it
    pub fn display_line(&self) -> String {
        let ts = self.timestamp.with_timezone(&Local).format("%H:%M:%S");
        match &self.outcome {
            ProbeOutcome::Success(ms) => format!("[{}] {}: {}ms", ts, self.host.name, format_ms(*ms)),
            ProbeOutcome::Timeout => format!("[{}] {}: Request timeout", ts, self.host.name),
            ProbeOutcome::Error(reason) => format!("[{}] {}: Error - {}", ts, self.host.name, reason),
        }
    }
}

/// Formats a latency without a trailing ".0" for whole milliseconds
pub fn format_ms(ms: f64) -> String {
    if ms.fract() == 0.0 {
        format!("{:.0}", ms)
    } else {
        format!("{:.1}", ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_line_variants() {
        let host = Arc::new(Host::new("cloudflare.com", "1.1.1.1"));
        let now = Utc::now();

        let ok = Sample::new(host.clone(), now, ProbeOutcome::Success(12.0), 0);
        assert!(ok.display_line().ends_with("cloudflare.com: 12ms"));

        let timeout = Sample::new(host.clone(), now, ProbeOutcome::Timeout, 1);
        assert!(timeout.display_line().ends_with("Request timeout"));
        assert!(timeout.is_failure());

        let err = Sample::new(host, now, ProbeOutcome::Error("no route".into()), 2);
        assert!(err.display_line().ends_with("Error - no route"));
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(65.0), "65");
        assert_eq!(format_ms(12.34), "12.3");
    }
}
