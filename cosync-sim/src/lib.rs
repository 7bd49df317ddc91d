//! Cosync Simulation Framework - Deterministic host/external co-simulation runs.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! This crate drives both sides of a synchronized run inside one process:
//! a scripted host on its own thread and a scripted external engine on the
//! caller's thread, sharing one [`cosync_core::Synchronizer`].
//!
//! # Features
//!
//! - **Deterministic Input**: Same seed always produces identical external input
//! - **Tick Schedules**: Fixed, regular or random host ticks against any step size
//! - **Invariant Checking**: Validate the exchange after every run
//! - **Edge Case Testing**: Pre-built scenarios for intermediate and sparse host ticks
//!
//! # Example
//!
//! ```rust,no_run
//! use cosync_sim::{HostTicks, Scenario, run_scenario};
//!
//! # fn main() -> anyhow::Result<()> {
//! let scenario = Scenario::builder("intermediate")
//!     .seed(12345)
//!     .host_ticks(HostTicks::Fixed(vec![0, 900, 1350, 1800]))
//!     .end_tick(1800)
//!     .build()?;
//!
//! let report = run_scenario(&scenario)?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Scripted Host**: Follows a tick schedule and answers with an echo grid model
//! - **Scripted External**: Generates demo input and follows the reported next tick
//! - **Scenario Library**: Pre-built timing patterns
//! - **Invariant System**: Post-run validation of the recorded trace

pub mod deterministic;
pub mod external;
pub mod fixtures;
pub mod host;
pub mod scenarios;

pub use deterministic::{
    DeterministicRng, HostTicks, Invariant, InvariantViolation, RunTrace, Scenario,
    ScenarioBuilder, ScenarioReport, SimulationError, TickSchedule, run_scenario,
};
pub use external::{ScriptedExternal, StepRecord};
pub use host::{HostTickRecord, ScriptedHost};
pub use scenarios::{ScenarioResults, ScenarioRunner, SimulationScenarios};
