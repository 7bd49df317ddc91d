//! Scenario definition and runner.
//!
//! A scenario runs a scripted host on its own thread against a scripted
//! external engine on the calling thread, both sharing one synchronizer.
//! All randomness comes from the scenario seed, so two runs with the same
//! seed make the same decisions.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use cosync_core::{CosyncConfig, ExternalAdapter, SimulationParameters, Synchronizer, Tick};
use thiserror::Error;
use tracing::{info, warn};

use super::invariants::{InvariantViolation, RunTrace, standard_invariants};
use super::rng::DeterministicRng;
use super::schedule::TickSchedule;
use crate::external::{ScriptedExternal, StepRecord};
use crate::fixtures::{demo_mapping, demo_request};
use crate::host::ScriptedHost;

/// Errors raised while setting up a scenario.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Host ticks do not form a valid schedule
    #[error("Invalid host schedule: {reason}")]
    InvalidSchedule {
        /// Why the schedule was rejected
        reason: String,
    },

    /// Scenario settings cannot be run
    #[error("Invalid scenario: {reason}")]
    InvalidScenario {
        /// Why the scenario was rejected
        reason: String,
    },
}

/// How the host picks its ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostTicks {
    /// Explicit ticks
    Fixed(Vec<Tick>),
    /// One tick every interval
    Regular(Tick),
    /// Random gaps up to the given maximum, drawn from the scenario seed
    Random {
        /// Largest gap between two host ticks
        max_gap: Tick,
    },
}

/// Fully resolved scenario ready to run.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Scenario name used in reports
    pub name: String,
    /// Seed for all random decisions
    pub seed: u64,
    /// External step size
    pub step_size: Tick,
    /// Last external time the run may reach
    pub end_tick: Tick,
    /// Host ticks, truncated to `end_tick`
    pub host_schedule: TickSchedule,
    /// Flexibility messages are exchanged
    pub flexibility: bool,
    /// Each step's input is submitted a second time
    pub resubmit: bool,
    /// Synchronizer and parser settings
    pub config: CosyncConfig,
}

impl Scenario {
    /// Starts building a scenario.
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder::new(name)
    }

    /// Parameters the external side hands to the host.
    pub fn parameters(&self) -> SimulationParameters {
        SimulationParameters {
            step_size: self.step_size,
            flexibility_enabled: self.flexibility,
            set_points_enabled: self.flexibility,
            grid_results_requested: true,
        }
    }
}

/// Builder for [`Scenario`].
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    name: String,
    seed: u64,
    step_size: Tick,
    end_tick: Tick,
    host_ticks: HostTicks,
    flexibility: bool,
    resubmit: bool,
    config: CosyncConfig,
}

impl ScenarioBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: 0,
            step_size: 900,
            end_tick: 3600,
            host_ticks: HostTicks::Regular(900),
            flexibility: false,
            resubmit: false,
            config: CosyncConfig::for_testing(),
        }
    }

    /// Sets the seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the external step size.
    pub fn step_size(mut self, step_size: Tick) -> Self {
        self.step_size = step_size;
        self
    }

    /// Sets the last external time.
    pub fn end_tick(mut self, end_tick: Tick) -> Self {
        self.end_tick = end_tick;
        self
    }

    /// Sets how the host picks its ticks.
    pub fn host_ticks(mut self, host_ticks: HostTicks) -> Self {
        self.host_ticks = host_ticks;
        self
    }

    /// Enables flexibility messages.
    pub fn flexibility(mut self, enabled: bool) -> Self {
        self.flexibility = enabled;
        self
    }

    /// Submits each step's input twice.
    pub fn resubmit(mut self, enabled: bool) -> Self {
        self.resubmit = enabled;
        self
    }

    /// Replaces the synchronizer and parser settings.
    pub fn config(mut self, config: CosyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolves the host schedule and validates the scenario.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidScenario` - Step size is zero
    /// - `SimulationError::InvalidSchedule` - Host ticks are not a valid schedule
    pub fn build(self) -> Result<Scenario, SimulationError> {
        if self.step_size == 0 {
            return Err(SimulationError::InvalidScenario {
                reason: "step size must be positive".to_string(),
            });
        }

        // Schedule randomness uses its own stream so input generation is unaffected.
        let mut schedule_rng = DeterministicRng::from_seed(self.seed ^ 0x5eed);
        let mut host_schedule = match self.host_ticks {
            HostTicks::Fixed(ticks) => TickSchedule::fixed(ticks)?,
            HostTicks::Regular(interval) => TickSchedule::regular(interval, self.end_tick)?,
            HostTicks::Random { max_gap } => {
                TickSchedule::random(&mut schedule_rng, self.end_tick, max_gap)
            }
        };
        host_schedule.truncate_after(self.end_tick);

        Ok(Scenario {
            name: self.name,
            seed: self.seed,
            step_size: self.step_size,
            end_tick: self.end_tick,
            host_schedule,
            flexibility: self.flexibility,
            resubmit: self.resubmit,
            config: self.config,
        })
    }
}

/// Outcome of a scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Seed the run used
    pub seed: u64,
    /// Everything both sides recorded
    pub trace: RunTrace,
    /// Invariants the run broke
    pub violations: Vec<InvariantViolation>,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl ScenarioReport {
    /// Returns true if no invariant was violated.
    pub fn success(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the external step at `time`.
    pub fn step(&self, time: Tick) -> Option<&StepRecord> {
        self.trace.step(time)
    }

    /// Returns a human readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!("Scenario '{}' (seed: {})\n", self.name, self.seed));
        summary.push_str(&format!("Duration: {:?}\n", self.elapsed));
        summary.push_str(&format!("External steps: {:?}\n", self.trace.step_times()));
        summary.push_str(&format!(
            "Host ticks processed: {}/{}\n",
            self.trace.host_ticks.len(),
            self.trace.host_schedule.len()
        ));
        summary.push_str(&format!("Success: {}\n", self.success()));

        if !self.violations.is_empty() {
            summary.push_str("\nInvariant violations:\n");
            for violation in &self.violations {
                summary.push_str(&format!("  - {violation}\n"));
            }
        }
        summary
    }
}

/// Runs a scenario to completion and checks the standard invariants.
///
/// # Errors
///
/// - Either side failed with a `CosyncError`
/// - The host thread could not be spawned or panicked
/// - The demo mapping could not be built
pub fn run_scenario(scenario: &Scenario) -> anyhow::Result<ScenarioReport> {
    let started = Instant::now();
    info!(
        name = %scenario.name,
        seed = scenario.seed,
        end_tick = scenario.end_tick,
        host_ticks = scenario.host_schedule.len(),
        "Starting scenario"
    );

    let mapping = Arc::new(demo_mapping().context("building demo mapping")?);
    let synchronizer = Arc::new(Synchronizer::new(&scenario.config.sync));

    let host = ScriptedHost::new(Arc::clone(&synchronizer), scenario.host_schedule.clone());
    let host_handle = thread::Builder::new()
        .name("cosync-host".to_string())
        .spawn(move || host.run())
        .context("spawning host thread")?;

    let adapter = ExternalAdapter::new(Arc::clone(&synchronizer), mapping, &scenario.config);
    let external = ScriptedExternal::new(
        adapter,
        DeterministicRng::from_seed(scenario.seed),
        scenario.end_tick,
        demo_request(scenario.flexibility),
    )
    .with_flexibility(scenario.flexibility)
    .with_resubmission(scenario.resubmit);
    let external_result = external.run(scenario.parameters());

    // Releases a host still waiting for an external time past the end.
    synchronizer.close();
    let host_result = host_handle
        .join()
        .map_err(|_| anyhow::anyhow!("host thread panicked"))?;

    let steps = external_result.with_context(|| format!("external side of '{}'", scenario.name))?;
    let host_ticks = host_result.with_context(|| format!("host side of '{}'", scenario.name))?;

    let trace = RunTrace {
        host_schedule: scenario.host_schedule.clone(),
        end_tick: scenario.end_tick,
        host_ticks,
        steps,
    };
    let violations: Vec<InvariantViolation> = standard_invariants()
        .iter()
        .filter_map(|invariant| invariant.check(&trace).err())
        .collect();
    for violation in &violations {
        warn!(%violation, "Scenario invariant violated");
    }

    let report = ScenarioReport {
        name: scenario.name.clone(),
        seed: scenario.seed,
        trace,
        violations,
        elapsed: started.elapsed(),
    };
    info!(
        name = %report.name,
        steps = report.trace.steps.len(),
        success = report.success(),
        "Scenario finished"
    );
    Ok(report)
}
