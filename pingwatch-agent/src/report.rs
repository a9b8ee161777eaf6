//! Periodic status report
//!
//! Snapshot of every host plus pipeline health, logged as one line per
//! host or printed to stdout as a single JSON document for scraping.

use chrono::{DateTime, Utc};
use pingwatch_core::model::format_ms;
use pingwatch_core::{HealthSnapshot, MonitorState, StatisticsSnapshot, TrayStatus};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct HostReport {
    pub name: String,
    pub address: String,
    pub reachable: bool,
    pub statistics: StatisticsSnapshot,
    pub last_sample: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub timestamp: DateTime<Utc>,
    pub tray: TrayStatus,
    pub hosts: Vec<HostReport>,
    pub health: HealthSnapshot,
}

impl StatusReport {
    pub fn collect(state: &MonitorState, health: HealthSnapshot) -> Self {
        let hosts = state
            .slots()
            .iter()
            .map(|slot| {
                let history = slot.history();
                HostReport {
                    name: slot.host().name.clone(),
                    address: slot.host().address.clone(),
                    reachable: slot.is_reachable(),
                    statistics: slot.statistics(),
                    last_sample: history.last().map(|s| s.display_line()),
                }
            })
            .collect();

        Self {
            timestamp: Utc::now(),
            tray: state.tray_status(),
            hosts,
            health,
        }
    }

    /// One compact JSON document, no trailing newline
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn emit(&self, json: bool) {
        if !json {
            self.log();
            return;
        }
        match self.to_json() {
            Ok(line) => println!("{}", line),
            Err(e) => {
                warn!("status report not serialisable, falling back to log: {}", e);
                self.log();
            }
        }
    }

    pub fn log(&self) {
        for host in &self.hosts {
            info!("{}", host.summary());
        }
        info!(
            "tray={:?} processed={} deviations_written={} dropped={} log_failures={}",
            self.tray,
            self.health.samples_processed,
            self.health.deviations_written,
            self.health.deviations_dropped,
            self.health.log_write_failures
        );
    }
}

impl HostReport {
    pub fn summary(&self) -> String {
        let stats = &self.statistics;
        let ms = |v: Option<f64>| v.map(format_ms).unwrap_or_else(|| "-".to_string());
        format!(
            "{} ({}) {} samples={} mean={} best={} worst={} good/warn/bad={}/{}/{} deviations={}",
            self.name,
            self.address,
            if self.reachable { "up" } else { "down" },
            stats.sample_count,
            ms(stats.mean_ms),
            ms(stats.best_ms),
            ms(stats.worst_ms),
            stats.good,
            stats.warn,
            stats.bad,
            stats.deviation_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingwatch_core::{Host, MonitorConfig, PipelineHealth};

    #[test]
    fn test_collect_before_any_sample() {
        let config = MonitorConfig {
            hosts: vec![Host::new("google.com", "8.8.8.8")],
            ..Default::default()
        };
        let state = MonitorState::new(&config);
        let report = StatusReport::collect(&state, PipelineHealth::new().snapshot());

        assert_eq!(report.tray, TrayStatus::Neutral);
        assert_eq!(report.hosts.len(), 1);
        assert!(!report.hosts[0].reachable);
        assert!(report.hosts[0].last_sample.is_none());
        assert!(report.hosts[0].summary().contains("mean=-"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tray"], "neutral");
        assert_eq!(json["hosts"][0]["name"], "google.com");
    }

    #[test]
    fn test_json_report_is_one_line() {
        let config = MonitorConfig {
            hosts: vec![
                Host::new("cloudflare.com", "1.1.1.1"),
                Host::new("seznam.cz", "77.75.77.222"),
            ],
            ..Default::default()
        };
        let state = MonitorState::new(&config);
        let report = StatusReport::collect(&state, PipelineHealth::new().snapshot());

        let line = report.to_json().unwrap();
        assert!(!line.contains('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["hosts"][1]["address"], "77.75.77.222");
        assert_eq!(parsed["hosts"][1]["reachable"], false);
        assert_eq!(parsed["health"]["samples_processed"], 0);
    }
}
