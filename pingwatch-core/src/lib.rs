/*!
# pingwatch-core - Latency Measurement Pipeline

Library behind the pingwatch agent:
- Concurrent probing of a fixed host list on a steady cadence
- Bounded handoff to a single aggregator owning all history
- Per-host statistics, severity buckets and tray status
- Durable, pruned log of threshold deviations
- Versioned runtime settings
*/

pub mod aggregator;
pub mod channel;
pub mod config;
pub mod deviation;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod history;
pub mod model;
pub mod monitor;
pub mod probe;
pub mod settings;
pub mod state;
pub mod stats;

pub use config::{DeviationLogConfig, MonitorConfig};
pub use deviation::{DeviationLogger, DeviationRecord};
pub use error::{ConfigError, LogWriteError, MonitorError, SettingsError};
pub use health::{HealthSnapshot, PipelineHealth};
pub use model::{Host, ProbeOutcome, Sample};
pub use monitor::{Monitor, MonitorHandle};
pub use probe::{Prober, SystemPingProber};
pub use settings::{RuntimeSettings, SettingsStore};
pub use state::{MonitorState, TrayStatus};
pub use stats::{Severity, SeverityBuckets, StatisticsSnapshot};
