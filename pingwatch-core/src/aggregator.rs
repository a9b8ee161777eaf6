//! Aggregation consumer
//!
//! Single writer of every host's history. Drains the result channel in
//! arrival order, restores per-host sequence order, appends to history,
//! refreshes statistics and hands deviations to the writer queue without
//! waiting on it.

use crate::channel::ResultReceiver;
use crate::deviation::DeviationQueue;
use crate::health::PipelineHealth;
use crate::model::Sample;
use crate::state::{DeriveParams, MonitorState};
use crate::stats::is_deviation;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Out-of-order samples held per host before a gap is declared lost
const MAX_PENDING: usize = 16;

/// Requests routed through the aggregator so it stays the only writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    ResetHost(String),
    ResetAll,
}

/// Releases samples of one host in sequence order
#[derive(Debug, Default)]
struct ReorderBuffer {
    next: u64,
    pending: BTreeMap<u64, Sample>,
}

impl ReorderBuffer {
    fn accept(&mut self, sample: Sample, ready: &mut Vec<Sample>) -> bool {
        let in_order = sample.sequence == self.next;
        if sample.sequence < self.next {
            warn!(
                "late sample {} for {} after gap skip, dropped",
                sample.sequence, sample.host.name
            );
            return false;
        }
        self.pending.insert(sample.sequence, sample);
        self.release(ready);

        if self.pending.len() > MAX_PENDING {
            if let Some(first) = self.pending.keys().next().copied() {
                warn!("sequence gap {}..{} treated as lost", self.next, first);
                self.next = first;
                self.release(ready);
            }
        }
        !in_order
    }

    fn release(&mut self, ready: &mut Vec<Sample>) {
        while let Some(sample) = self.pending.remove(&self.next) {
            self.next += 1;
            ready.push(sample);
        }
    }

    fn flush(&mut self, ready: &mut Vec<Sample>) {
        let pending = std::mem::take(&mut self.pending);
        for (seq, sample) in pending {
            self.next = seq + 1;
            ready.push(sample);
        }
    }
}

pub struct Aggregator {
    state: MonitorState,
    params: DeriveParams,
    receiver: ResultReceiver,
    control: mpsc::UnboundedReceiver<Control>,
    deviations: DeviationQueue,
    health: PipelineHealth,
    reorder: HashMap<String, ReorderBuffer>,
}

impl Aggregator {
    pub(crate) fn new(
        state: MonitorState,
        params: DeriveParams,
        receiver: ResultReceiver,
        control: mpsc::UnboundedReceiver<Control>,
        deviations: DeviationQueue,
        health: PipelineHealth,
    ) -> Self {
        Self {
            state,
            params,
            receiver,
            control,
            deviations,
            health,
            reorder: HashMap::new(),
        }
    }

    /// Consume until the result channel closes, then release anything still
    /// waiting on a gap. Dropping the aggregator closes the deviation queue.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_sample = self.receiver.recv() => {
                    match maybe_sample {
                        Some(sample) => self.accept(sample),
                        None => break,
                    }
                }
                Some(command) = self.control.recv() => self.handle(command),
            }
        }

        // stragglers
        let mut ready = Vec::new();
        for buffer in self.reorder.values_mut() {
            buffer.flush(&mut ready);
        }
        for sample in ready {
            self.process(sample);
        }
        info!("aggregator drained");
    }

    fn accept(&mut self, sample: Sample) {
        let mut ready = Vec::new();
        let buffer = self.reorder.entry(sample.host.name.clone()).or_default();
        if buffer.accept(sample, &mut ready) {
            self.health.sample_reordered();
        }
        for sample in ready {
            self.process(sample);
        }
    }

    fn process(&self, sample: Sample) {
        let Some(slot) = self.state.slot(&sample.host.name) else {
            warn!("sample for unknown host {} ignored", sample.host.name);
            return;
        };

        debug!("{} #{} {:?}", sample.host.name, sample.sequence, sample.outcome);
        let deviation = is_deviation(
            &sample,
            self.params.threshold_ms,
            self.params.unreachable_is_deviation,
        );
        if deviation {
            slot.apply(sample.clone(), &self.params);
            self.deviations.submit(sample);
        } else {
            slot.apply(sample, &self.params);
        }
        self.health.sample_processed();
    }

    fn handle(&self, command: Control) {
        match command {
            Control::ResetHost(name) => match self.state.slot(&name) {
                Some(slot) => {
                    slot.reset();
                    info!("statistics reset for {}", name);
                }
                None => warn!("reset requested for unknown host {}", name),
            },
            Control::ResetAll => {
                for slot in self.state.slots() {
                    slot.reset();
                }
                info!("statistics reset for all hosts");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::result_channel;
    use crate::config::MonitorConfig;
    use crate::deviation::{spawn_writer, DeviationLogger};
    use crate::model::{Host, ProbeOutcome};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample(seq: u64) -> Sample {
        let host = Arc::new(Host::new("google.com", "8.8.8.8"));
        Sample::new(host, Utc::now(), ProbeOutcome::Success(1.0), seq)
    }

    fn seqs(ready: &[Sample]) -> Vec<u64> {
        ready.iter().map(|s| s.sequence).collect()
    }

    #[test]
    fn test_reorder_releases_in_sequence() {
        let mut buffer = ReorderBuffer::default();
        let mut ready = Vec::new();

        assert!(!buffer.accept(sample(0), &mut ready));
        assert!(buffer.accept(sample(2), &mut ready));
        assert_eq!(seqs(&ready), vec![0]);

        buffer.accept(sample(1), &mut ready);
        assert_eq!(seqs(&ready), vec![0, 1, 2]);
    }

    #[test]
    fn test_gap_is_skipped_when_buffer_overflows() {
        let mut buffer = ReorderBuffer::default();
        let mut ready = Vec::new();

        // sequence 0 never arrives
        for seq in 1..=(MAX_PENDING as u64 + 1) {
            buffer.accept(sample(seq), &mut ready);
        }
        assert_eq!(seqs(&ready), (1..=MAX_PENDING as u64 + 1).collect::<Vec<_>>());

        // the lost sample showing up late must not break ordering
        let before = ready.len();
        buffer.accept(sample(0), &mut ready);
        assert_eq!(ready.len(), before);
    }

    #[test]
    fn test_flush_releases_pending_in_order() {
        let mut buffer = ReorderBuffer::default();
        let mut ready = Vec::new();
        buffer.accept(sample(3), &mut ready);
        buffer.accept(sample(5), &mut ready);
        assert!(ready.is_empty());

        buffer.flush(&mut ready);
        assert_eq!(seqs(&ready), vec![3, 5]);
        assert_eq!(buffer.next, 6);
    }

    #[tokio::test]
    async fn test_capacity_bound_after_650_ticks() {
        let dir = TempDir::new().unwrap();
        let mut config = MonitorConfig::default();
        config.deviation_log.path = dir.path().join("deviations.txt");
        assert_eq!(config.hosts.len(), 3);
        assert_eq!(config.history_capacity(), 600);

        let health = PipelineHealth::new();
        let state = MonitorState::new(&config);
        let logger = DeviationLogger::new(&config.deviation_log, 60.0, true);
        let (queue, writer) = spawn_writer(logger, &config.deviation_log, health.clone());
        let (tx, rx) = result_channel(config.channel_capacity());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let aggregator = Aggregator::new(
            state.clone(),
            DeriveParams::from_config(&config),
            rx,
            control_rx,
            queue,
            health.clone(),
        );
        let consumer = tokio::spawn(aggregator.run());

        let start = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let hosts = state.hosts();
        for tick in 0..650u64 {
            let ts = start + Duration::seconds(tick as i64);
            // hosts complete in a different order every tick
            for idx in 0..hosts.len() {
                let host = hosts[(idx + tick as usize) % hosts.len()].clone();
                tx.send(Sample::new(host, ts, ProbeOutcome::Success(20.0), tick))
                    .await
                    .unwrap();
            }
        }
        drop(tx);
        drop(control_tx);
        consumer.await.unwrap();
        writer.await.unwrap();

        for host in &hosts {
            let history = state.history(&host.name).unwrap();
            assert_eq!(history.len(), 600);
            assert_eq!(history[0].sequence, 50);
            assert_eq!(history[599].sequence, 649);
        }
        assert_eq!(health.snapshot().samples_processed, 1950);
    }
}
