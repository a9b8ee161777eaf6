use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthSnapshot {
    pub uptime_seconds: u64,
    pub ticks_dispatched: u64,
    pub samples_processed: u64,
    pub samples_reordered: u64,
    pub deviations_queued: u64,
    pub deviations_written: u64,
    pub deviations_dropped: u64,
    pub log_write_failures: u64,
    pub last_log_error: Option<String>,
}

#[derive(Debug)]
struct Counters {
    start_time: Instant,
    ticks_dispatched: AtomicU64,
    samples_processed: AtomicU64,
    samples_reordered: AtomicU64,
    deviations_queued: AtomicU64,
    deviations_written: AtomicU64,
    deviations_dropped: AtomicU64,
    log_write_failures: AtomicU64,
    last_log_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct PipelineHealth {
    counters: Arc<Counters>,
}

impl PipelineHealth {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters {
                start_time: Instant::now(),
                ticks_dispatched: AtomicU64::new(0),
                samples_processed: AtomicU64::new(0),
                samples_reordered: AtomicU64::new(0),
                deviations_queued: AtomicU64::new(0),
                deviations_written: AtomicU64::new(0),
                deviations_dropped: AtomicU64::new(0),
                log_write_failures: AtomicU64::new(0),
                last_log_error: Mutex::new(None),
            }),
        }
    }

    pub fn tick_dispatched(&self) {
        self.counters.ticks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_processed(&self) {
        self.counters.samples_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_reordered(&self) {
        self.counters.samples_reordered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deviation_queued(&self) {
        self.counters.deviations_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deviation_written(&self) {
        self.counters.deviations_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deviation_dropped(&self) {
        self.counters.deviations_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed deviation log operation
    pub fn log_failure(&self, error: &dyn std::error::Error) {
        self.counters.log_write_failures.fetch_add(1, Ordering::Relaxed);
        *self.counters.last_log_error.lock() = Some(error.to_string());
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let c = &self.counters;
        HealthSnapshot {
            uptime_seconds: c.start_time.elapsed().as_secs(),
            ticks_dispatched: c.ticks_dispatched.load(Ordering::Relaxed),
            samples_processed: c.samples_processed.load(Ordering::Relaxed),
            samples_reordered: c.samples_reordered.load(Ordering::Relaxed),
            deviations_queued: c.deviations_queued.load(Ordering::Relaxed),
            deviations_written: c.deviations_written.load(Ordering::Relaxed),
            deviations_dropped: c.deviations_dropped.load(Ordering::Relaxed),
            log_write_failures: c.log_write_failures.load(Ordering::Relaxed),
            last_log_error: c.last_log_error.lock().clone(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_shared_between_clones() {
        let health = PipelineHealth::new();
        let other = health.clone();
        other.sample_processed();
        other.sample_processed();
        health.deviation_queued();

        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk busy");
        other.log_failure(&err);

        let snap = health.snapshot();
        assert_eq!(snap.samples_processed, 2);
        assert_eq!(snap.deviations_queued, 1);
        assert_eq!(snap.log_write_failures, 1);
        assert_eq!(snap.last_log_error.as_deref(), Some("disk busy"));
    }
}
