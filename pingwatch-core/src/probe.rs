//! Latency probes
//!
//! A prober performs exactly one echo exchange per call and never retries;
//! the next tick is the retry. Every probe is bounded by a deadline and a
//! probe that runs past it is abandoned and reported as a timeout.

use crate::model::{Host, ProbeOutcome};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

pub trait Prober: Send + Sync {
    /// Probe `host` once, resolving within roughly `deadline`
    fn probe<'a>(&'a self, host: &'a Host, deadline: Duration) -> BoxFuture<'a, ProbeOutcome>;
}

/// Run `probe` under a hard deadline. Used by the dispatcher so even a
/// misbehaving prober cannot hold a tick open.
pub async fn probe_with_deadline(prober: &dyn Prober, host: &Host, deadline: Duration) -> ProbeOutcome {
    match tokio::time::timeout(deadline, prober.probe(host, deadline)).await {
        Ok(outcome) => outcome,
        Err(_) => ProbeOutcome::Timeout,
    }
}

/// Prober backed by the platform `ping` utility
#[derive(Debug, Clone, Default)]
pub struct SystemPingProber;

impl SystemPingProber {
    pub fn new() -> Self {
        Self
    }

    fn command(address: &str, deadline: Duration) -> AsyncCommand {
        let mut cmd = AsyncCommand::new("ping");
        if cfg!(target_os = "windows") {
            let wait_ms = deadline.as_millis().max(1).to_string();
            cmd.args(["-n", "1", "-w", &wait_ms, address]);
        } else if cfg!(target_os = "macos") {
            // macOS -W takes milliseconds
            let wait_ms = deadline.as_millis().max(1).to_string();
            cmd.args(["-c", "1", "-W", &wait_ms, address]);
        } else {
            let wait_secs = deadline.as_secs().max(1).to_string();
            cmd.args(["-c", "1", "-W", &wait_secs, address]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, host: &Host, deadline: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let output = tokio::time::timeout(deadline, Self::command(&host.address, deadline).output()).await;

        let output = match output {
            Err(_) => return ProbeOutcome::Timeout,
            Ok(Err(e)) => return ProbeOutcome::Error(format!("failed to run ping: {}", e)),
            Ok(Ok(output)) => output,
        };

        debug!(
            "ping {} exited with {:?} after {}ms",
            host.address,
            output.status.code(),
            start.elapsed().as_millis()
        );

        if !output.status.success() {
            return ProbeOutcome::Timeout;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        // A reply without a parseable time still counts as reachable
        ProbeOutcome::Success(parse_round_trip_ms(&stdout).unwrap_or(0.0))
    }
}

impl Prober for SystemPingProber {
    fn probe<'a>(&'a self, host: &'a Host, deadline: Duration) -> BoxFuture<'a, ProbeOutcome> {
        self.run(host, deadline).boxed()
    }
}

/// Extract the round-trip time from ping output.
///
/// Handles `time=12.3 ms` (Linux/macOS), `time=12ms` and `time<1ms`
/// (Windows). `time<1` is reported as the bound itself.
pub fn parse_round_trip_ms(output: &str) -> Option<f64> {
    output.lines().find_map(round_trip_in_line)
}

/// First `time=` or `time<` field on a line that carries a number
fn round_trip_in_line(line: &str) -> Option<f64> {
    line.match_indices("time").find_map(|(idx, _)| {
        // skip words ending in "time", e.g. a host named "runtime"
        let standalone = line[..idx]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric() && c != '_');
        if !standalone {
            return None;
        }
        let rest = line[idx + 4..]
            .strip_prefix('=')
            .or_else(|| line[idx + 4..].strip_prefix('<'))?;
        let number: String = rest
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        number.parse::<f64>().ok()
    })
}
