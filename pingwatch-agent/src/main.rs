//! pingwatch - headless latency monitor
//!
//! Probes a fixed list of hosts once per interval and keeps:
//! - a rolling in-memory history with per-host statistics
//! - a durable log of samples above the deviation threshold
//! - a periodic status report on the log output, or as JSON on stdout
//!
//! Settings subcommands edit the runtime settings file without starting
//! the monitor.

mod cli;
mod report;

use anyhow::{Context, Result};
use cli::{Command, USAGE};
use pingwatch_core::{Monitor, MonitorConfig, SettingsStore, SystemPingProber};
use report::StatusReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const REPORT_ENV: &str = "PINGWATCH_REPORT_SECS";
const DEFAULT_REPORT_SECS: u64 = 10;
const REPORT_JSON_ENV: &str = "PINGWATCH_REPORT_JSON";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pingwatch=info")),
        )
        .init();

    match Command::parse(std::env::args().skip(1))? {
        Command::Run => run().await,
        Command::ShowSettings => show_settings().await,
        Command::SetCloseToTray(value) => set_close_to_tray(value).await,
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

async fn open_settings() -> Result<SettingsStore> {
    let path = SettingsStore::default_path().context("Failed to locate settings file")?;
    SettingsStore::open(&path)
        .await
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

async fn show_settings() -> Result<()> {
    let store = open_settings().await?;
    let settings = store.current();
    println!("file: {}", store.path().display());
    println!("version: {}", settings.version);
    match settings.close_to_tray {
        Some(value) => println!("close_to_tray: {}", value),
        None => println!("close_to_tray: unset (first run)"),
    }
    Ok(())
}

async fn set_close_to_tray(value: bool) -> Result<()> {
    let store = open_settings().await?;
    let expected = store.current().version;
    let updated = store
        .update(expected, |s| s.close_to_tray = Some(value))
        .await
        .context("Failed to update settings")?;
    info!("close_to_tray = {} (settings v{})", value, updated.version);
    Ok(())
}

fn report_interval() -> Duration {
    let secs = std::env::var(REPORT_ENV)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_REPORT_SECS);
    Duration::from_secs(secs)
}

fn report_as_json() -> bool {
    std::env::var(REPORT_JSON_ENV)
        .map(|v| flag_enabled(&v))
        .unwrap_or(false)
}

fn flag_enabled(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

async fn run() -> Result<()> {
    info!("pingwatch v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = MonitorConfig::resolve_path();
    let config = MonitorConfig::load(&config_path)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    match open_settings().await {
        Ok(store) if store.is_first_run() => {
            info!("first run: choose the close behaviour with `pingwatch settings set close-to-tray <bool>`");
        }
        Ok(store) => info!("close_to_tray = {:?}", store.current().close_to_tray),
        Err(e) => warn!("runtime settings unavailable: {:#}", e),
    }

    let handle = Monitor::start(config, Arc::new(SystemPingProber::new()))
        .context("Failed to start monitor")?;
    for host in handle.hosts() {
        info!("monitoring {}", host);
    }

    let json_report = report_as_json();
    let mut report_timer = interval(report_interval());
    // first tick fires immediately with nothing to show
    report_timer.tick().await;

    loop {
        tokio::select! {
            _ = report_timer.tick() => {
                StatusReport::collect(&handle.state(), handle.health()).emit(json_report);
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("failed to listen for ctrl-c: {}", e);
                }
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
