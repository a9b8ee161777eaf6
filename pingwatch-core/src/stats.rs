//! Statistics engine
//!
//! Pure derivation of per-host aggregates from a history snapshot. Nothing
//! here holds state of its own; the aggregator caches the last result and
//! replaces it on every append.

use crate::model::Sample;
use serde::{Deserialize, Serialize};

/// Severity bucket used for colouring and status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Good,
    Warn,
    Bad,
}

/// Fixed latency boundaries of the severity buckets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityBuckets {
    /// Latencies strictly below this are good
    pub good_below_ms: f64,
    /// Latencies strictly above this are bad
    pub bad_above_ms: f64,
}

impl Default for SeverityBuckets {
    fn default() -> Self {
        Self {
            good_below_ms: 40.0,
            bad_above_ms: 60.0,
        }
    }
}

impl SeverityBuckets {
    /// Classify a sample; failures always land in the worst bucket
    pub fn classify(&self, sample: &Sample) -> Severity {
        match sample.latency_ms() {
            Some(ms) => self.classify_latency(ms),
            None => Severity::Bad,
        }
    }

    pub fn classify_latency(&self, ms: f64) -> Severity {
        if ms < self.good_below_ms {
            Severity::Good
        } else if ms <= self.bad_above_ms {
            Severity::Warn
        } else {
            Severity::Bad
        }
    }
}

/// Derived aggregates over a host's current history buffer
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StatisticsSnapshot {
    pub sample_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Mean over successful samples; `None` when there are none
    pub mean_ms: Option<f64>,
    pub best_ms: Option<f64>,
    pub worst_ms: Option<f64>,
    pub good: usize,
    pub warn: usize,
    pub bad: usize,
    /// Samples in the buffer that count as deviations
    pub deviation_count: usize,
}

/// Compute the snapshot over `samples`
pub fn compute<'a, I>(
    samples: I,
    buckets: &SeverityBuckets,
    deviation_threshold_ms: f64,
    unreachable_is_deviation: bool,
) -> StatisticsSnapshot
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut snapshot = StatisticsSnapshot::default();
    let mut total = 0.0;

    for sample in samples {
        snapshot.sample_count += 1;
        match buckets.classify(sample) {
            Severity::Good => snapshot.good += 1,
            Severity::Warn => snapshot.warn += 1,
            Severity::Bad => snapshot.bad += 1,
        }

        if is_deviation(sample, deviation_threshold_ms, unreachable_is_deviation) {
            snapshot.deviation_count += 1;
        }

        match sample.latency_ms() {
            Some(ms) => {
                snapshot.success_count += 1;
                total += ms;
                snapshot.best_ms = Some(snapshot.best_ms.map_or(ms, |b| b.min(ms)));
                snapshot.worst_ms = Some(snapshot.worst_ms.map_or(ms, |w| w.max(ms)));
            }
            None => snapshot.failure_count += 1,
        }
    }

    if snapshot.success_count > 0 {
        snapshot.mean_ms = Some(total / snapshot.success_count as f64);
    }
    snapshot
}

/// Strictly-greater threshold check; failures count when configured to
pub fn is_deviation(sample: &Sample, threshold_ms: f64, unreachable_is_deviation: bool) -> bool {
    match sample.latency_ms() {
        Some(ms) => ms > threshold_ms,
        None => unreachable_is_deviation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Host, ProbeOutcome};
    use chrono::Utc;
    use std::sync::Arc;

    fn samples(outcomes: Vec<ProbeOutcome>) -> Vec<Sample> {
        let host = Arc::new(Host::new("google.com", "8.8.8.8"));
        outcomes
            .into_iter()
            .enumerate()
            .map(|(i, o)| Sample::new(host.clone(), Utc::now(), o, i as u64))
            .collect()
    }

    #[test]
    fn test_bucket_boundaries() {
        let buckets = SeverityBuckets::default();
        assert_eq!(buckets.classify_latency(39.9), Severity::Good);
        assert_eq!(buckets.classify_latency(40.0), Severity::Warn);
        assert_eq!(buckets.classify_latency(60.0), Severity::Warn);
        assert_eq!(buckets.classify_latency(60.5), Severity::Bad);
    }

    #[test]
    fn test_compute_mixed_buffer() {
        let buf = samples(vec![
            ProbeOutcome::Success(20.0),
            ProbeOutcome::Success(50.0),
            ProbeOutcome::Success(80.0),
            ProbeOutcome::Timeout,
        ]);
        let stats = compute(&buf, &SeverityBuckets::default(), 60.0, true);

        assert_eq!(stats.sample_count, 4);
        assert_eq!(stats.success_count, 3);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.mean_ms, Some(50.0));
        assert_eq!(stats.best_ms, Some(20.0));
        assert_eq!(stats.worst_ms, Some(80.0));
        assert_eq!((stats.good, stats.warn, stats.bad), (1, 1, 2));
        assert_eq!(stats.deviation_count, 2);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let buf = samples(vec![ProbeOutcome::Success(33.0), ProbeOutcome::Error("x".into())]);
        let buckets = SeverityBuckets::default();
        assert_eq!(compute(&buf, &buckets, 60.0, false), compute(&buf, &buckets, 60.0, false));
    }

    #[test]
    fn test_empty_buffer() {
        let stats = compute(Vec::<Sample>::new().iter(), &SeverityBuckets::default(), 60.0, true);
        assert_eq!(stats.sample_count, 0);
        assert_eq!(stats.mean_ms, None);
    }

    #[test]
    fn test_threshold_is_strict() {
        let buf = samples(vec![
            ProbeOutcome::Success(60.0),
            ProbeOutcome::Success(61.0),
            ProbeOutcome::Timeout,
        ]);
        assert!(!is_deviation(&buf[0], 60.0, true));
        assert!(is_deviation(&buf[1], 60.0, true));
        assert!(is_deviation(&buf[2], 60.0, true));
        assert!(!is_deviation(&buf[2], 60.0, false));
    }
}
