use crate::model::Sample;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// FIFO of samples capped by count and by a time window
#[derive(Debug, Clone)]
pub struct HistoryStore {
    samples: VecDeque<Sample>,
    max_count: usize,
    retention: Duration,
}

impl HistoryStore {
    pub fn new(max_count: usize, retention: Duration) -> Self {
        let max_count = max_count.max(1);
        Self {
            samples: VecDeque::with_capacity(max_count.min(1024)),
            max_count,
            retention,
        }
    }

    /// Append and evict, using the sample's own timestamp as "now"
    pub fn append(&mut self, sample: Sample) {
        let now = sample.timestamp;
        self.append_at(sample, now);
    }

    pub fn append_at(&mut self, sample: Sample, now: DateTime<Utc>) {
        self.samples.push_back(sample);
        self.evict(now);
    }

    /// Drop samples older than the retention window relative to `now`
    pub fn evict(&mut self, now: DateTime<Utc>) {
        // a window reaching before the earliest representable time evicts by count only
        let cutoff = now.checked_sub_signed(self.retention);
        while let Some(oldest) = self.samples.front() {
            let expired = cutoff.is_some_and(|c| oldest.timestamp < c);
            if self.samples.len() > self.max_count || expired {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Ordered copy of the current buffer
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn capacity(&self) -> usize {
        self.max_count
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Host, ProbeOutcome};
    use std::sync::Arc;

    fn sample_at(host: &Arc<Host>, ts: DateTime<Utc>, seq: u64) -> Sample {
        Sample::new(host.clone(), ts, ProbeOutcome::Success(10.0), seq)
    }

    #[test]
    fn test_capacity_bound_evicts_oldest_first() {
        let host = Arc::new(Host::new("seznam.cz", "77.75.77.222"));
        let start = Utc::now();
        let mut store = HistoryStore::new(600, Duration::minutes(10));

        for i in 0..650u64 {
            store.append(sample_at(&host, start + Duration::seconds(i as i64), i));
        }

        assert_eq!(store.len(), 600);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.first().map(|s| s.sequence), Some(50));
        assert_eq!(snapshot.last().map(|s| s.sequence), Some(649));
    }

    #[test]
    fn test_time_window_evicts_even_below_capacity() {
        let host = Arc::new(Host::new("google.com", "8.8.8.8"));
        let start = Utc::now();
        let mut store = HistoryStore::new(1000, Duration::seconds(30));

        store.append(sample_at(&host, start, 0));
        store.append(sample_at(&host, start + Duration::seconds(10), 1));
        store.append(sample_at(&host, start + Duration::seconds(45), 2));

        let seqs: Vec<u64> = store.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
        let newest = store.latest().map(|s| s.timestamp).unwrap();
        assert!(store.iter().all(|s| s.timestamp >= newest - store.retention()));
    }

    #[test]
    fn test_count_is_min_of_n_and_capacity() {
        let host = Arc::new(Host::new("a", "10.0.0.1"));
        let start = Utc::now();
        for n in [1usize, 5, 10, 25] {
            let mut store = HistoryStore::new(10, Duration::hours(1));
            for i in 0..n {
                store.append(sample_at(&host, start + Duration::seconds(i as i64), i as u64));
            }
            assert_eq!(store.len(), n.min(10));
        }
    }

    #[test]
    fn test_window_beyond_calendar_evicts_by_count_only() {
        let host = Arc::new(Host::new("a", "10.0.0.1"));
        let mut store = HistoryStore::new(3, Duration::days(365 * 200_000_000));
        for i in 0..5u64 {
            store.append(sample_at(&host, Utc::now(), i));
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_minimum_capacity_is_one() {
        let store = HistoryStore::new(0, Duration::minutes(1));
        assert_eq!(store.capacity(), 1);
    }
}
