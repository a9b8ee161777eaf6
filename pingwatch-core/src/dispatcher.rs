/*!
PROBE DISPATCHER - Tick loop driving every probe

ROLE:
One loop drives the cadence. Each tick launches one probe task per host
into a task group, tagged with that host's next sequence number.

BOUNDS:
- Hard deadline of one interval per task
- Shared in-flight limit across hosts
- A task that misses its deadline or panics still yields a sample, so
  every tick produces exactly one sample per host

BACKPRESSURE:
Finished samples are forwarded into the bounded result channel from the
loop itself. When the aggregator falls behind the loop waits and ticks
are delayed instead of piling up.
*/

use crate::channel::ResultSender;
use crate::config::MonitorConfig;
use crate::health::PipelineHealth;
use crate::model::{Host, ProbeOutcome, Sample};
use crate::probe::{probe_with_deadline, Prober};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What a probe task was launched for, so a failed task still yields a sample
struct Launched {
    host: Arc<Host>,
    sequence: u64,
    timestamp: DateTime<Utc>,
}

pub struct Dispatcher {
    hosts: Vec<Arc<Host>>,
    sequences: Vec<u64>,
    prober: Arc<dyn Prober>,
    interval: Duration,
    limiter: Arc<Semaphore>,
    sender: ResultSender,
    health: PipelineHealth,
    warmup: bool,
    launched: HashMap<task::Id, Launched>,
}

impl Dispatcher {
    pub fn new(
        config: &MonitorConfig,
        hosts: Vec<Arc<Host>>,
        prober: Arc<dyn Prober>,
        sender: ResultSender,
        health: PipelineHealth,
    ) -> Self {
        Self {
            sequences: vec![0; hosts.len()],
            hosts,
            prober,
            interval: config.probe_interval(),
            limiter: Arc::new(Semaphore::new(config.in_flight_limit())),
            sender,
            health,
            warmup: config.warmup,
            launched: HashMap::new(),
        }
    }

    /// Run until `shutdown` flips to true (or its sender is dropped), then
    /// let in-flight probes finish and forward their samples. Dropping the
    /// dispatcher afterwards closes the result channel.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if self.warmup {
            self.warmup_round().await;
        }

        info!(
            "dispatcher started: {} hosts every {}ms",
            self.hosts.len(),
            self.interval.as_millis()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks: JoinSet<Sample> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    self.forward(joined).await;
                }
                _ = ticker.tick() => {
                    self.dispatch_tick(&mut tasks);
                }
            }
        }

        info!("dispatcher stopping, waiting for {} in-flight probes", tasks.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            self.forward(joined).await;
        }
        debug!("dispatcher drained");
    }

    /// One unrecorded probe per host to warm resolver and ARP caches
    async fn warmup_round(&self) {
        debug!("performing warm-up probes");
        let probes = self
            .hosts
            .iter()
            .map(|host| probe_with_deadline(self.prober.as_ref(), host, self.interval));
        futures::future::join_all(probes).await;
    }

    fn dispatch_tick(&mut self, tasks: &mut JoinSet<Sample>) {
        let timestamp = Utc::now();
        for (idx, host) in self.hosts.iter().enumerate() {
            let sequence = self.sequences[idx];
            self.sequences[idx] += 1;

            let task_host = host.clone();
            let prober = self.prober.clone();
            let limiter = self.limiter.clone();
            let deadline = self.interval;

            let abort = tasks.spawn(async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(deadline, limiter.acquire_owned()).await {
                    Ok(Ok(_permit)) => {
                        let remaining = deadline.saturating_sub(started.elapsed());
                        probe_with_deadline(prober.as_ref(), &task_host, remaining).await
                    }
                    Ok(Err(_)) => ProbeOutcome::Error("probe limiter closed".to_string()),
                    // every slot busy for the whole interval
                    Err(_) => ProbeOutcome::Timeout,
                };
                Sample::new(task_host, timestamp, outcome, sequence)
            });
            self.launched.insert(
                abort.id(),
                Launched {
                    host: host.clone(),
                    sequence,
                    timestamp,
                },
            );
        }
        self.health.tick_dispatched();
        debug!("tick dispatched, {} samples queued", self.sender.queued());
    }

    async fn forward(&mut self, joined: Result<(task::Id, Sample), JoinError>) {
        let sample = match joined {
            Ok((id, sample)) => {
                self.launched.remove(&id);
                sample
            }
            Err(e) => {
                let Some(launched) = self.launched.remove(&e.id()) else {
                    warn!("unknown probe task failed: {}", e);
                    return;
                };
                warn!(
                    "probe task for {} #{} failed: {}",
                    launched.host.name, launched.sequence, e
                );
                Sample::new(
                    launched.host,
                    launched.timestamp,
                    ProbeOutcome::Error("probe task failed".to_string()),
                    launched.sequence,
                )
            }
        };

        if let Err(sample) = self.sender.send(sample).await {
            warn!(
                "aggregator gone, sample {} for {} discarded",
                sample.sequence, sample.host.name
            );
        }
    }
}
