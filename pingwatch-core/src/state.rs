//! Shared per-host state and the read-only query surface
//!
//! The aggregator is the only writer. Each host's history, cached
//! statistics and status window sit behind a single lock, so a reader
//! always observes a buffer and statistics that agree with each other.
//! Readers receive copies and never hold the lock beyond the copy.

use crate::config::MonitorConfig;
use crate::history::HistoryStore;
use crate::model::{Host, Sample};
use crate::stats::{self, SeverityBuckets, StatisticsSnapshot};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Tray icon colour derived from the first configured host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrayStatus {
    /// No successful sample seen yet
    Neutral,
    Healthy,
    Degraded,
}

/// Parameters the writer needs to keep derived values current
#[derive(Debug, Clone)]
pub(crate) struct DeriveParams {
    pub buckets: SeverityBuckets,
    pub threshold_ms: f64,
    pub unreachable_is_deviation: bool,
    pub status_window: usize,
    pub status_degraded_ratio: f64,
}

impl DeriveParams {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            buckets: config.severity,
            threshold_ms: config.deviation_threshold_ms,
            unreachable_is_deviation: config.unreachable_is_deviation,
            status_window: config.status_window,
            status_degraded_ratio: config.status_degraded_ratio,
        }
    }
}

#[derive(Debug)]
struct HostView {
    history: HistoryStore,
    stats: StatisticsSnapshot,
    /// Latest successful latencies, feeding the tray status
    recent_latencies: VecDeque<f64>,
}

#[derive(Debug)]
pub struct HostSlot {
    host: Arc<Host>,
    view: RwLock<HostView>,
}

impl HostSlot {
    fn new(host: Arc<Host>, history: HistoryStore) -> Self {
        Self {
            host,
            view: RwLock::new(HostView {
                history,
                stats: StatisticsSnapshot::default(),
                recent_latencies: VecDeque::new(),
            }),
        }
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// Append, evict and refresh derived values in one critical section
    pub(crate) fn apply(&self, sample: Sample, params: &DeriveParams) {
        let mut view = self.view.write();
        if let Some(ms) = sample.latency_ms() {
            view.recent_latencies.push_back(ms);
            while view.recent_latencies.len() > params.status_window {
                view.recent_latencies.pop_front();
            }
        }
        view.history.append(sample);
        let derived = stats::compute(
            view.history.iter(),
            &params.buckets,
            params.threshold_ms,
            params.unreachable_is_deviation,
        );
        view.stats = derived;
    }

    pub(crate) fn reset(&self) {
        let mut view = self.view.write();
        view.history.clear();
        view.stats = StatisticsSnapshot::default();
        view.recent_latencies.clear();
    }

    pub fn history(&self) -> Vec<Sample> {
        self.view.read().history.snapshot()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.view.read().stats.clone()
    }

    pub fn capacity(&self) -> usize {
        self.view.read().history.capacity()
    }

    pub fn is_reachable(&self) -> bool {
        self.view
            .read()
            .history
            .latest()
            .map(|s| !s.is_failure())
            .unwrap_or(false)
    }

    fn tray_status(&self, threshold_ms: f64, degraded_ratio: f64) -> TrayStatus {
        let view = self.view.read();
        if view.recent_latencies.is_empty() {
            return TrayStatus::Neutral;
        }
        let high = view
            .recent_latencies
            .iter()
            .filter(|ms| **ms > threshold_ms)
            .count();
        if high as f64 / view.recent_latencies.len() as f64 > degraded_ratio {
            TrayStatus::Degraded
        } else {
            TrayStatus::Healthy
        }
    }
}

/// Fixed set of host slots plus the read API over them
#[derive(Debug, Clone)]
pub struct MonitorState {
    slots: Arc<Vec<Arc<HostSlot>>>,
    by_name: Arc<HashMap<String, usize>>,
    threshold_ms: f64,
    degraded_ratio: f64,
}

impl MonitorState {
    pub fn new(config: &MonitorConfig) -> Self {
        let capacity = config.history_capacity();
        let retention = config.display_retention();
        let slots: Vec<Arc<HostSlot>> = config
            .hosts
            .iter()
            .map(|h| {
                Arc::new(HostSlot::new(
                    Arc::new(h.clone()),
                    HistoryStore::new(capacity, retention),
                ))
            })
            .collect();
        let by_name = config
            .hosts
            .iter()
            .enumerate()
            .map(|(i, h)| (h.name.clone(), i))
            .collect();

        Self {
            slots: Arc::new(slots),
            by_name: Arc::new(by_name),
            threshold_ms: config.deviation_threshold_ms,
            degraded_ratio: config.status_degraded_ratio,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&Arc<HostSlot>> {
        self.by_name.get(name).map(|i| &self.slots[*i])
    }

    pub fn slots(&self) -> &[Arc<HostSlot>] {
        &self.slots
    }

    /// Hosts in configured order
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        self.slots.iter().map(|s| s.host.clone()).collect()
    }

    pub fn current_statistics(&self, name: &str) -> Option<StatisticsSnapshot> {
        self.slot(name).map(|s| s.statistics())
    }

    pub fn history(&self, name: &str) -> Option<Vec<Sample>> {
        self.slot(name).map(|s| s.history())
    }

    /// Whether the host's latest sample succeeded; unknown hosts are not
    pub fn is_reachable_status(&self, name: &str) -> bool {
        self.slot(name).map(|s| s.is_reachable()).unwrap_or(false)
    }

    /// Status of the first configured host only
    pub fn tray_status(&self) -> TrayStatus {
        self.slots
            .first()
            .map(|s| s.tray_status(self.threshold_ms, self.degraded_ratio))
            .unwrap_or(TrayStatus::Neutral)
    }
}
