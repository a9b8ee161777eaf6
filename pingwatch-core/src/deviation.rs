//! Deviation logger
//!
//! Appends one human-readable line per deviation to a durable text log and
//! prunes records older than the retention window. The aggregator never
//! calls into the file directly: it hands samples to a bounded queue that a
//! dedicated writer task drains, so slow disks cannot stall history updates.
//!
//! Line format:
//! `[2026-10-19T08:15:02.123Z] host=cloudflare.com address=1.1.1.1 latency_ms=65 threshold_ms=60`

use crate::config::DeviationLogConfig;
use crate::error::LogWriteError;
use crate::health::PipelineHealth;
use crate::model::{format_ms, Sample};
use crate::stats::is_deviation;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const UNREACHABLE: &str = "unreachable";

/// One persisted deviation
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationRecord {
    pub host: String,
    pub address: String,
    pub timestamp: DateTime<Utc>,
    /// `None` for an unreachable host
    pub latency_ms: Option<f64>,
    pub threshold_ms: f64,
}

impl DeviationRecord {
    pub fn from_sample(sample: &Sample, threshold_ms: f64) -> Self {
        Self {
            host: sample.host.name.clone(),
            address: sample.host.address.clone(),
            timestamp: sample.timestamp,
            latency_ms: sample.latency_ms(),
            threshold_ms,
        }
    }

    pub fn to_line(&self) -> String {
        let latency = self
            .latency_ms
            .map(format_ms)
            .unwrap_or_else(|| UNREACHABLE.to_string());
        format!(
            "[{}] host={} address={} latency_ms={} threshold_ms={}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.host,
            self.address,
            latency,
            format_ms(self.threshold_ms),
        )
    }

    /// Parse a log line. Host names may contain spaces, so fields are
    /// located from the right.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end();
        let rest = line.strip_prefix('[')?;
        let close = rest.find("] ")?;
        let timestamp = DateTime::parse_from_rfc3339(&rest[..close])
            .ok()?
            .with_timezone(&Utc);
        let fields = &rest[close + 2..];

        let (fields, threshold) = fields.rsplit_once(" threshold_ms=")?;
        let (fields, latency) = fields.rsplit_once(" latency_ms=")?;
        let (host, address) = fields.rsplit_once(" address=")?;
        let host = host.strip_prefix("host=")?;

        let latency_ms = if latency == UNREACHABLE {
            None
        } else {
            Some(latency.parse().ok()?)
        };

        Some(Self {
            host: host.to_string(),
            address: address.to_string(),
            timestamp,
            latency_ms,
            threshold_ms: threshold.parse().ok()?,
        })
    }
}

/// Extract only the timestamp of a line, for pruning
fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let rest = line.strip_prefix('[')?;
    let close = rest.find("] ")?;
    DateTime::parse_from_rfc3339(&rest[..close])
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[derive(Debug, Clone)]
pub struct DeviationLogger {
    path: PathBuf,
    retention: chrono::Duration,
    max_attempts: u32,
    backoff: Duration,
    threshold_ms: f64,
    unreachable_is_deviation: bool,
}

impl DeviationLogger {
    pub fn new(config: &DeviationLogConfig, threshold_ms: f64, unreachable_is_deviation: bool) -> Self {
        Self {
            path: config.path.clone(),
            retention: config.retention(),
            max_attempts: config.max_write_attempts.max(1),
            backoff: config.retry_backoff(),
            threshold_ms,
            unreachable_is_deviation,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record for `sample` if it exceeds the threshold
    pub async fn record(&self, sample: &Sample) -> Result<Option<DeviationRecord>, LogWriteError> {
        if !is_deviation(sample, self.threshold_ms, self.unreachable_is_deviation) {
            return Ok(None);
        }
        let record = DeviationRecord::from_sample(sample, self.threshold_ms);
        self.append(&record).await?;
        Ok(Some(record))
    }

    /// Append with bounded retries
    pub async fn append(&self, record: &DeviationRecord) -> Result<(), LogWriteError> {
        let line = record.to_line();
        let mut attempt = 1;
        loop {
            match self.try_append(&line).await {
                Ok(()) => {
                    debug!("deviation logged for {}", record.host);
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "deviation log write attempt {}/{} failed: {}",
                        attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(LogWriteError::Exhausted {
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }

    /// Single `write_all` on an append-mode handle so a line lands whole
    async fn try_append(&self, line: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await
    }

    /// Remove records at or before `now - retention`. Lines that cannot be
    /// parsed are kept. The file is replaced atomically.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<usize, LogWriteError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(LogWriteError::Prune(e)),
        };

        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            return Ok(0);
        };
        let mut kept = String::with_capacity(content.len());
        let mut removed = 0;
        for line in content.lines() {
            match line_timestamp(line) {
                Some(ts) if ts <= cutoff => removed += 1,
                _ => {
                    kept.push_str(line);
                    kept.push('\n');
                }
            }
        }

        if removed == 0 {
            return Ok(0);
        }

        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, kept).await.map_err(LogWriteError::Prune)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(LogWriteError::Prune)?;
        info!("pruned {} deviation records from {}", removed, self.path.display());
        Ok(removed)
    }

    /// All parseable records, oldest first
    pub async fn read_records(&self) -> std::io::Result<Vec<DeviationRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(content.lines().filter_map(DeviationRecord::parse_line).collect())
    }

    /// Records for `host` newer than `now - window`
    pub async fn recent_count(
        &self,
        host: &str,
        window: chrono::Duration,
        now: DateTime<Utc>,
    ) -> std::io::Result<usize> {
        let cutoff = now.checked_sub_signed(window);
        let records = self.read_records().await?;
        Ok(records
            .iter()
            .filter(|r| r.host == host && cutoff.map_or(true, |c| r.timestamp > c))
            .count())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Producer side of the deviation handoff, held by the aggregator
#[derive(Clone)]
pub struct DeviationQueue {
    tx: mpsc::Sender<Sample>,
    health: PipelineHealth,
}

impl DeviationQueue {
    /// Never blocks; a full queue drops the record and reports it
    pub fn submit(&self, sample: Sample) {
        let host = sample.host.name.clone();
        match self.tx.try_send(sample) {
            Ok(()) => self.health.deviation_queued(),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let err = LogWriteError::QueueFull { host };
                error!("{}", err);
                self.health.deviation_dropped();
                self.health.log_failure(&err);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("deviation writer stopped, record for {} not logged", host);
                self.health.deviation_dropped();
            }
        }
    }
}

/// Start the writer task. It prunes on its first tick (startup) and every
/// `prune_interval`, appends queued deviations, and exits once every queue
/// handle is dropped and the backlog is flushed.
pub fn spawn_writer(
    logger: DeviationLogger,
    config: &DeviationLogConfig,
    health: PipelineHealth,
) -> (DeviationQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Sample>(config.queue_capacity.max(1));
    let queue = DeviationQueue {
        tx,
        health: health.clone(),
    };
    let prune_every = config.prune_interval();

    let handle = tokio::spawn(async move {
        let mut prune_timer = tokio::time::interval(prune_every);
        loop {
            tokio::select! {
                maybe_sample = rx.recv() => {
                    let Some(sample) = maybe_sample else { break };
                    match logger.record(&sample).await {
                        Ok(Some(_)) => health.deviation_written(),
                        Ok(None) => {}
                        Err(e) => {
                            error!("{}", e);
                            health.log_failure(&e);
                        }
                    }
                }
                _ = prune_timer.tick() => {
                    if let Err(e) = logger.prune(Utc::now()).await {
                        error!("{}", e);
                        health.log_failure(&e);
                    }
                }
            }
        }
        debug!("deviation writer drained and stopped");
    });

    (queue, handle)
}
