/*!
# pingwatch DevKit - Stubs and Utilities for Pipeline Tests

Helpers for driving the monitor without touching the network:
- Scripted prober with per-host outcomes and delays
- Test harness with a temporary deviation log and fast cadence
*/

pub mod scripted_prober;
pub mod test_utils;

pub use scripted_prober::{ProbeCall, ScriptedProber, Step};
pub use test_utils::TestHarness;
