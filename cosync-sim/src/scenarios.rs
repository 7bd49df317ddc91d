//! Pre-built scenarios for common host/external timing patterns.
//!
//! Each scenario reproduces a specific relationship between the host's tick
//! schedule and the external step size, for systematic testing of the
//! synchronizer.

use std::collections::BTreeMap;

use crate::deterministic::{HostTicks, Scenario, ScenarioReport, SimulationError, run_scenario};

/// Pre-built scenarios for systematic testing.
pub struct SimulationScenarios;

impl SimulationScenarios {
    /// Host ticks in lockstep with the external step size.
    ///
    /// Baseline where every step is aligned and no intermediate tick occurs.
    ///
    /// # Errors
    ///
    /// - `SimulationError` - Never for the fixed settings
    pub fn lockstep(seed: u64) -> Result<Scenario, SimulationError> {
        Scenario::builder("lockstep")
            .seed(seed)
            .host_ticks(HostTicks::Regular(900))
            .end_tick(3600)
            .build()
    }

    /// Host computes between external steps, forcing intermediate ticks.
    ///
    /// # Errors
    ///
    /// - `SimulationError` - Never for the fixed settings
    pub fn intermediate_ticks(seed: u64) -> Result<Scenario, SimulationError> {
        Scenario::builder("intermediate_ticks")
            .seed(seed)
            .host_ticks(HostTicks::Fixed(vec![0, 900, 1350, 1800, 2250, 2700, 3000, 3600]))
            .end_tick(3600)
            .build()
    }

    /// Host computes rarely, so most external steps run without it.
    ///
    /// # Errors
    ///
    /// - `SimulationError` - Never for the fixed settings
    pub fn sparse_host(seed: u64) -> Result<Scenario, SimulationError> {
        Scenario::builder("sparse_host")
            .seed(seed)
            .host_ticks(HostTicks::Fixed(vec![0, 2000, 5000]))
            .end_tick(5400)
            .build()
    }

    /// Host computes far more often than the external side steps.
    ///
    /// # Errors
    ///
    /// - `SimulationError` - Never for the fixed settings
    pub fn dense_host(seed: u64) -> Result<Scenario, SimulationError> {
        Scenario::builder("dense_host")
            .seed(seed)
            .host_ticks(HostTicks::Regular(300))
            .end_tick(2700)
            .build()
    }

    /// Host ticks drawn at random from the seed.
    ///
    /// # Errors
    ///
    /// - `SimulationError` - Never for the fixed settings
    pub fn random_host(seed: u64) -> Result<Scenario, SimulationError> {
        Scenario::builder("random_host")
            .seed(seed)
            .host_ticks(HostTicks::Random { max_gap: 1500 })
            .end_tick(5400)
            .build()
    }

    /// Flexibility requests and options exchanged every step, with input
    /// submitted twice to exercise deduplication.
    ///
    /// # Errors
    ///
    /// - `SimulationError` - Never for the fixed settings
    pub fn flexibility_exchange(seed: u64) -> Result<Scenario, SimulationError> {
        Scenario::builder("flexibility_exchange")
            .seed(seed)
            .host_ticks(HostTicks::Fixed(vec![0, 900, 1200, 1800, 2700]))
            .end_tick(2700)
            .flexibility(true)
            .resubmit(true)
            .build()
    }

    /// Returns every pre-built scenario for `seed`.
    ///
    /// # Errors
    ///
    /// - `SimulationError` - A scenario failed to build
    pub fn all(seed: u64) -> Result<Vec<Scenario>, SimulationError> {
        Ok(vec![
            Self::lockstep(seed)?,
            Self::intermediate_ticks(seed)?,
            Self::sparse_host(seed)?,
            Self::dense_host(seed)?,
            Self::random_host(seed)?,
            Self::flexibility_exchange(seed)?,
        ])
    }
}

/// Test runner for systematic scenario validation.
pub struct ScenarioRunner {
    seed: u64,
}

impl ScenarioRunner {
    /// Creates new runner with specified seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Runs all pre-built scenarios and collects their reports.
    ///
    /// # Errors
    ///
    /// - A scenario failed to build or one of its sides failed
    pub fn run_all_scenarios(&self) -> anyhow::Result<ScenarioResults> {
        let mut results = ScenarioResults::default();
        for scenario in SimulationScenarios::all(self.seed)? {
            let report = run_scenario(&scenario)?;
            results.add_result(report);
        }
        Ok(results)
    }
}

/// Collection of reports from multiple scenarios.
#[derive(Debug, Default)]
pub struct ScenarioResults {
    results: BTreeMap<String, ScenarioReport>,
}

impl ScenarioResults {
    /// Stores a report under its scenario name.
    pub fn add_result(&mut self, report: ScenarioReport) {
        self.results.insert(report.name.clone(), report);
    }

    /// Returns the report of scenario `name`.
    pub fn get_result(&self, name: &str) -> Option<&ScenarioReport> {
        self.results.get(name)
    }

    /// Returns true if every scenario held all invariants.
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(ScenarioReport::success)
    }

    /// Returns one line per scenario.
    pub fn summary(&self) -> String {
        let mut summary = String::from("Scenario Results\n");
        summary.push_str(&format!("{:-<60}\n", ""));
        for (name, report) in &self.results {
            summary.push_str(&format!(
                "{}: steps {} | host ticks {} | violations {}\n",
                name,
                report.trace.steps.len(),
                report.trace.host_ticks.len(),
                report.violations.len()
            ));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_scenarios_build() {
        let scenarios = SimulationScenarios::all(7).unwrap();
        assert_eq!(scenarios.len(), 6);
        assert!(scenarios.iter().all(|scenario| scenario.seed == 7));
    }

    #[test]
    fn test_dense_host_intermediate_ticks_bounded_by_end() {
        let scenario = SimulationScenarios::dense_host(1).unwrap();
        assert_eq!(scenario.host_schedule.last(), Some(2700));
        assert_eq!(scenario.host_schedule.len(), 10);
    }
}
