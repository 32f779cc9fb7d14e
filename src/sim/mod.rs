//! Scenario pipeline: time utilities, flow balance, the orchestrating engine
//! and its comparison metrics.

/// Wall-clock times, windows, day filters and cadence inference.
pub mod clock;
pub mod engine;
pub mod kpi;
/// Flow collapse and PV offset stages.
pub mod power_balance;
pub mod types;

pub use engine::{Scenario, run_many};
