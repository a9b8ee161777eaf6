/*!
Scripted prober for tests without network access

Each host gets a cyclic script of outcomes and delays. Every call is
recorded so tests can check cadence and which hosts were probed.
*/

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use pingwatch_core::{Host, ProbeOutcome, Prober};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply
#[derive(Debug, Clone)]
pub struct Step {
    pub outcome: ProbeOutcome,
    pub delay: Duration,
    /// Panic instead of answering, after the delay
    pub crash: bool,
}

impl Step {
    pub fn reply(ms: f64) -> Self {
        Self {
            outcome: ProbeOutcome::Success(ms),
            delay: Duration::ZERO,
            crash: false,
        }
    }

    pub fn timeout() -> Self {
        Self {
            outcome: ProbeOutcome::Timeout,
            delay: Duration::ZERO,
            crash: false,
        }
    }

    /// The probe task panics, as a buggy prober would
    pub fn crash() -> Self {
        Self {
            outcome: ProbeOutcome::Timeout,
            delay: Duration::ZERO,
            crash: true,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProbeCall {
    pub host: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct Script {
    steps: Vec<Step>,
    cursor: usize,
}

/// Prober answering from per-host scripts; unscripted hosts reply in 1ms
#[derive(Clone, Default)]
pub struct ScriptedProber {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    calls: Arc<Mutex<Vec<ProbeCall>>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every probe of `host` with the same outcome
    pub fn respond(self, host: &str, outcome: ProbeOutcome) -> Self {
        self.script(
            host,
            vec![Step {
                outcome,
                delay: Duration::ZERO,
                crash: false,
            }],
        )
    }

    /// Replay `steps` for `host`, wrapping around at the end
    pub fn script(self, host: &str, steps: Vec<Step>) -> Self {
        if !steps.is_empty() {
            self.scripts
                .lock()
                .unwrap()
                .insert(host.to_string(), Script { steps, cursor: 0 });
        }
        self
    }

    pub fn calls(&self) -> Vec<ProbeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, host: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.host == host)
            .count()
    }

    fn next_step(&self, host: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(host) {
            Some(script) => {
                let step = script.steps[script.cursor % script.steps.len()].clone();
                script.cursor += 1;
                step
            }
            None => Step::reply(1.0),
        }
    }
}

impl Prober for ScriptedProber {
    fn probe<'a>(&'a self, host: &'a Host, _deadline: Duration) -> BoxFuture<'a, ProbeOutcome> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(ProbeCall {
                host: host.name.clone(),
                at: Utc::now(),
            });
            let step = self.next_step(&host.name);
            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }
            if step.crash {
                panic!("[SCRIPT] crash while probing {}", host.name);
            }
            log::debug!("[SCRIPT] {} -> {:?}", host.name, step.outcome);
            step.outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_cycles_and_records() {
        let prober = ScriptedProber::new().script(
            "a",
            vec![Step::reply(10.0), Step::timeout()],
        );
        let a = Host::new("a", "10.0.0.1");
        let b = Host::new("b", "10.0.0.2");
        let deadline = Duration::from_secs(1);

        assert_eq!(prober.probe(&a, deadline).await, ProbeOutcome::Success(10.0));
        assert_eq!(prober.probe(&a, deadline).await, ProbeOutcome::Timeout);
        assert_eq!(prober.probe(&a, deadline).await, ProbeOutcome::Success(10.0));
        assert_eq!(prober.probe(&b, deadline).await, ProbeOutcome::Success(1.0));

        assert_eq!(prober.call_count("a"), 3);
        assert_eq!(prober.calls().len(), 4);
    }
}
