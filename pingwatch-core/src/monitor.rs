/*!
MONITOR - Pipeline assembly and lifecycle

PIPELINE:
- dispatcher: ticks and probe tasks
- bounded result channel
- aggregator: history, statistics, reordering
- deviation writer: durable log and pruning

`MonitorHandle` is the only thing callers keep. It exposes the read API
and stops the pipeline in order on `shutdown()`.
*/

use crate::aggregator::{Aggregator, Control};
use crate::channel::result_channel;
use crate::config::MonitorConfig;
use crate::deviation::{spawn_writer, DeviationLogger, DeviationRecord};
use crate::dispatcher::Dispatcher;
use crate::error::MonitorError;
use crate::health::{HealthSnapshot, PipelineHealth};
use crate::model::{Host, Sample};
use crate::probe::Prober;
use crate::state::{DeriveParams, MonitorState, TrayStatus};
use crate::stats::StatisticsSnapshot;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Monitor;

impl Monitor {
    /// Validate `config` and start every pipeline task on the current
    /// runtime. Configuration errors are the only startup failure.
    pub fn start(config: MonitorConfig, prober: Arc<dyn Prober>) -> Result<MonitorHandle, MonitorError> {
        config.validate()?;

        let health = PipelineHealth::new();
        let state = MonitorState::new(&config);
        let params = DeriveParams::from_config(&config);

        let logger = DeviationLogger::new(
            &config.deviation_log,
            config.deviation_threshold_ms,
            config.unreachable_is_deviation,
        );
        let (queue, writer) = spawn_writer(logger.clone(), &config.deviation_log, health.clone());

        let (sender, receiver) = result_channel(config.channel_capacity());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let aggregator = Aggregator::new(
            state.clone(),
            params,
            receiver,
            control_rx,
            queue,
            health.clone(),
        );
        let aggregator = tokio::spawn(aggregator.run());

        let dispatcher = Dispatcher::new(&config, state.hosts(), prober, sender, health.clone());
        let dispatcher = tokio::spawn(dispatcher.run(shutdown_rx));

        info!(
            "monitor started: {} hosts, history capacity {}, deviation log {}",
            config.hosts.len(),
            config.history_capacity(),
            logger.path().display()
        );

        Ok(MonitorHandle {
            state,
            health,
            logger,
            control: control_tx,
            shutdown: shutdown_tx,
            tasks: Some(PipelineTasks {
                dispatcher,
                aggregator,
                writer,
            }),
        })
    }
}

struct PipelineTasks {
    dispatcher: JoinHandle<()>,
    aggregator: JoinHandle<()>,
    writer: JoinHandle<()>,
}

pub struct MonitorHandle {
    state: MonitorState,
    health: PipelineHealth,
    logger: DeviationLogger,
    control: mpsc::UnboundedSender<Control>,
    shutdown: watch::Sender<bool>,
    tasks: Option<PipelineTasks>,
}

impl MonitorHandle {
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        self.state.hosts()
    }

    pub fn current_statistics(&self, host: &str) -> Option<StatisticsSnapshot> {
        self.state.current_statistics(host)
    }

    pub fn history(&self, host: &str) -> Option<Vec<Sample>> {
        self.state.history(host)
    }

    pub fn is_reachable_status(&self, host: &str) -> bool {
        self.state.is_reachable_status(host)
    }

    pub fn tray_status(&self) -> TrayStatus {
        self.state.tray_status()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Cloneable read-only view for reporters
    pub fn state(&self) -> MonitorState {
        self.state.clone()
    }

    /// Clear one host's history and statistics
    pub fn reset_host(&self, host: &str) {
        if self.control.send(Control::ResetHost(host.to_string())).is_err() {
            warn!("monitor stopped, reset of {} ignored", host);
        }
    }

    pub fn reset_all(&self) {
        if self.control.send(Control::ResetAll).is_err() {
            warn!("monitor stopped, reset ignored");
        }
    }

    /// Records currently in the deviation log
    pub async fn deviation_records(&self) -> std::io::Result<Vec<DeviationRecord>> {
        self.logger.read_records().await
    }

    /// Logged deviations for `host` within the last `window`
    pub async fn recent_deviations(&self, host: &str, window: chrono::Duration) -> std::io::Result<usize> {
        self.logger.recent_count(host, window, Utc::now()).await
    }

    /// Stop ticking, drain in-flight probes and queued samples, then flush
    /// pending deviation records before returning.
    pub async fn shutdown(mut self) {
        let Some(tasks) = self.tasks.take() else {
            return;
        };
        info!("monitor shutting down");
        let _ = self.shutdown.send(true);

        if let Err(e) = tasks.dispatcher.await {
            warn!("dispatcher task ended abnormally: {}", e);
        }
        if let Err(e) = tasks.aggregator.await {
            warn!("aggregator task ended abnormally: {}", e);
        }
        if let Err(e) = tasks.writer.await {
            warn!("deviation writer ended abnormally: {}", e);
        }
        info!("monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviationLogConfig;
    use crate::model::ProbeOutcome;
    use futures::future::BoxFuture;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixed;

    impl Prober for Fixed {
        fn probe<'a>(&'a self, host: &'a Host, _deadline: Duration) -> BoxFuture<'a, ProbeOutcome> {
            Box::pin(async move {
                match host.name.as_str() {
                    "slow" => ProbeOutcome::Success(90.0),
                    "down" => ProbeOutcome::Timeout,
                    _ => ProbeOutcome::Success(10.0),
                }
            })
        }
    }

    fn config(dir: &TempDir) -> MonitorConfig {
        MonitorConfig {
            hosts: vec![
                Host::new("fast", "10.0.0.1"),
                Host::new("slow", "10.0.0.2"),
                Host::new("down", "10.0.0.3"),
            ],
            probe_interval_ms: 20,
            warmup: false,
            deviation_log: DeviationLogConfig {
                path: dir.path().join("deviations.txt"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.hosts.clear();
        let result = Monitor::start(config, Arc::new(Fixed));
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }

    #[tokio::test]
    async fn test_pipeline_end_to_end() {
        let dir = TempDir::new().unwrap();
        let handle = Monitor::start(config(&dir), Arc::new(Fixed)).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let fast = handle.current_statistics("fast").unwrap();
        assert!(fast.sample_count > 0);
        assert!(handle.is_reachable_status("fast"));
        assert!(!handle.is_reachable_status("down"));
        assert_eq!(handle.tray_status(), TrayStatus::Healthy);

        let state = handle.state();
        handle.shutdown().await;

        let slow_history = state.history("slow").unwrap();
        let records = DeviationLogger::new(
            &config(&dir).deviation_log,
            60.0,
            true,
        )
        .read_records()
        .await
        .unwrap();
        let slow_records = records.iter().filter(|r| r.host == "slow").count();
        let down_records = records.iter().filter(|r| r.host == "down").count();
        assert_eq!(slow_records, slow_history.len());
        assert_eq!(down_records, state.history("down").unwrap().len());
        assert!(records.iter().all(|r| r.host != "fast"));
    }

    #[tokio::test]
    async fn test_reset_host_clears_statistics() {
        let dir = TempDir::new().unwrap();
        let handle = Monitor::start(config(&dir), Arc::new(Fixed)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.current_statistics("fast").unwrap().sample_count > 0);

        handle.reset_host("fast");
        tokio::time::sleep(Duration::from_millis(60)).await;

        let state = handle.state();
        handle.shutdown().await;
        let fast = state.history("fast").unwrap().len();
        let slow = state.history("slow").unwrap().len();
        assert!(fast < slow, "reset host kept {} of {} samples", fast, slow);
        assert_eq!(state.current_statistics("fast").unwrap().sample_count, fast);
    }
}
