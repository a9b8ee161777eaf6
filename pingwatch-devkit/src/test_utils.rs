/*!
Test harness for the monitoring pipeline

Provides:
- A temporary directory holding the deviation log
- A fast-cadence config builder
- Polling helpers that wait on pipeline state with a timeout
*/

use anyhow::Result;
use chrono::{DateTime, Utc};
use pingwatch_core::{
    DeviationLogger, DeviationRecord, Host, Monitor, MonitorConfig, MonitorHandle, Prober,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub struct TestHarness {
    pub config: MonitorConfig,
    dir: TempDir,
}

impl TestHarness {
    /// Three hosts, 20ms cadence, no warm-up, log inside a temp dir
    pub fn new() -> Result<Self> {
        env_logger::try_init().ok();

        let dir = TempDir::new()?;
        let mut config = MonitorConfig {
            hosts: vec![
                Host::new("cloudflare.com", "1.1.1.1"),
                Host::new("google.com", "8.8.8.8"),
                Host::new("seznam.cz", "77.75.77.222"),
            ],
            probe_interval_ms: 20,
            warmup: false,
            ..Default::default()
        };
        config.deviation_log.path = dir.path().join("deviations.txt");
        config.deviation_log.retry_backoff_ms = 1;

        Ok(Self { config, dir })
    }

    pub fn with_hosts(mut self, hosts: &[(&str, &str)]) -> Self {
        self.config.hosts = hosts.iter().map(|(n, a)| Host::new(*n, *a)).collect();
        self
    }

    pub fn with_interval_ms(mut self, ms: u64) -> Self {
        self.config.probe_interval_ms = ms;
        self
    }

    pub fn with_threshold_ms(mut self, ms: f64) -> Self {
        self.config.deviation_threshold_ms = ms;
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.config.deviation_log.path.clone()
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    pub fn start(&self, prober: impl Prober + 'static) -> Result<MonitorHandle> {
        let handle = Monitor::start(self.config.clone(), Arc::new(prober))?;
        log::info!("[HARNESS] monitor started with {} hosts", self.config.hosts.len());
        Ok(handle)
    }

    /// Write records straight into the deviation log, e.g. to test pruning
    pub fn seed_log(&self, records: &[(&str, DateTime<Utc>, Option<f64>)]) -> Result<()> {
        let mut content = String::new();
        for (name, ts, latency) in records {
            let address = self
                .config
                .hosts
                .iter()
                .find(|h| h.name == *name)
                .map(|h| h.address.clone())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            let record = DeviationRecord {
                host: name.to_string(),
                address,
                timestamp: *ts,
                latency_ms: *latency,
                threshold_ms: self.config.deviation_threshold_ms,
            };
            content.push_str(&record.to_line());
        }
        std::fs::write(self.log_path(), content)?;
        Ok(())
    }

    pub async fn read_log(&self) -> Result<Vec<DeviationRecord>> {
        let logger = DeviationLogger::new(
            &self.config.deviation_log,
            self.config.deviation_threshold_ms,
            self.config.unreachable_is_deviation,
        );
        Ok(logger.read_records().await?)
    }

    /// Poll until `host` has at least `count` samples in history
    pub async fn wait_for_samples(
        &self,
        handle: &MonitorHandle,
        host: &str,
        count: usize,
        timeout_ms: u64,
    ) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            let seen = handle.history(host).map(|h| h.len()).unwrap_or(0);
            if seen >= count {
                log::info!("[HARNESS] {} reached {} samples", host, seen);
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        log::warn!("[HARNESS] timeout waiting for {} samples of {}", count, host);
        false
    }
}
