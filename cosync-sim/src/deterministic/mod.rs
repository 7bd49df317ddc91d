//! Deterministic scenario framework for host/external synchronization.
//!
//! This module provides reproducible runs of a scripted host against a
//! scripted external engine, with invariant checks over what both sides
//! recorded.

mod invariants;
mod rng;
mod scenario;
mod schedule;

// Re-export core types for public API
pub use invariants::{
    AlignedResultsInvariant, HostTicksServicedInvariant, IdempotentInputInvariant,
    IntermediateHintInvariant, Invariant, InvariantViolation, MonotonicStepsInvariant, RunTrace,
    standard_invariants,
};
pub use rng::DeterministicRng;
pub use scenario::{
    HostTicks, Scenario, ScenarioBuilder, ScenarioReport, SimulationError, run_scenario,
};
pub use schedule::TickSchedule;

#[cfg(test)]
mod tests;
