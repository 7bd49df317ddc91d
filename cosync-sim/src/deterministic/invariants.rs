//! Invariant checking framework for scenario runs.

use std::fmt;

use cosync_core::Tick;

use super::schedule::TickSchedule;
use crate::external::StepRecord;
use crate::host::HostTickRecord;

/// Everything both sides recorded during one run.
#[derive(Debug, Clone)]
pub struct RunTrace {
    /// Host schedule the run was configured with
    pub host_schedule: TickSchedule,
    /// Last external time the run was allowed to reach
    pub end_tick: Tick,
    /// Host records in tick order
    pub host_ticks: Vec<HostTickRecord>,
    /// External records in step order
    pub steps: Vec<StepRecord>,
}

impl RunTrace {
    /// Returns the external step at `time`.
    pub fn step(&self, time: Tick) -> Option<&StepRecord> {
        self.steps.iter().find(|step| step.time == time)
    }

    /// Returns the host record at `tick`.
    pub fn host_tick(&self, tick: Tick) -> Option<&HostTickRecord> {
        self.host_ticks.iter().find(|record| record.tick == tick)
    }

    /// Returns external step times in order.
    pub fn step_times(&self) -> Vec<Tick> {
        self.steps.iter().map(|step| step.time).collect()
    }
}

/// Violation of a run invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// Tick at which the violation was detected
    pub tick: Option<Tick>,
}

impl InvariantViolation {
    fn new(invariant: &str, tick: Option<Tick>, description: String) -> Self {
        Self {
            invariant: invariant.to_string(),
            description,
            tick,
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tick {
            Some(tick) => write!(
                f,
                "Invariant '{}' violated at tick {}: {}",
                self.invariant, tick, self.description
            ),
            None => write!(f, "Invariant '{}' violated: {}", self.invariant, self.description),
        }
    }
}

/// Trait for checking run invariants.
pub trait Invariant: Send + Sync {
    /// Checks if invariant holds for a finished run.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the invariant condition is not met.
    fn check(&self, trace: &RunTrace) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;
}

/// External steps start at 0 and strictly increase.
pub struct MonotonicStepsInvariant;

impl Invariant for MonotonicStepsInvariant {
    fn check(&self, trace: &RunTrace) -> Result<(), InvariantViolation> {
        if let Some(first) = trace.steps.first() {
            if first.time != 0 {
                return Err(InvariantViolation::new(
                    self.name(),
                    Some(first.time),
                    "first external step is not at tick 0".to_string(),
                ));
            }
        }
        if let Some(pair) = trace.steps.windows(2).find(|pair| pair[0].time >= pair[1].time) {
            return Err(InvariantViolation::new(
                self.name(),
                Some(pair[1].time),
                format!("step at {} follows step at {}", pair[1].time, pair[0].time),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MonotonicSteps"
    }
}

/// Every host tick within the run is met by an external step, aligned.
pub struct HostTicksServicedInvariant;

impl Invariant for HostTicksServicedInvariant {
    fn check(&self, trace: &RunTrace) -> Result<(), InvariantViolation> {
        let last_step = trace.steps.last().map_or(0, |step| step.time);

        for tick in trace.host_schedule.ticks().iter().copied() {
            if tick > last_step {
                continue;
            }
            if trace.step(tick).is_none() {
                return Err(InvariantViolation::new(
                    self.name(),
                    Some(tick),
                    "external side never stepped at this host tick".to_string(),
                ));
            }
            match trace.host_tick(tick) {
                Some(record) if record.aligned => {}
                Some(_) => {
                    return Err(InvariantViolation::new(
                        self.name(),
                        Some(tick),
                        "host processed the tick without meeting the external side".to_string(),
                    ));
                }
                None => {
                    return Err(InvariantViolation::new(
                        self.name(),
                        Some(tick),
                        "host never processed the tick".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "HostTicksServiced"
    }
}

/// An aligned host tick always delivers its result to the external step.
pub struct AlignedResultsInvariant;

impl Invariant for AlignedResultsInvariant {
    fn check(&self, trace: &RunTrace) -> Result<(), InvariantViolation> {
        for record in trace.host_ticks.iter().filter(|record| record.aligned) {
            match trace.step(record.tick) {
                Some(step) if !step.host_result => {
                    return Err(InvariantViolation::new(
                        self.name(),
                        Some(record.tick),
                        "host result not received by the external step".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "AlignedResults"
    }
}

/// Repeating an unchanged input within one step forwards nothing new.
pub struct IdempotentInputInvariant;

impl Invariant for IdempotentInputInvariant {
    fn check(&self, trace: &RunTrace) -> Result<(), InvariantViolation> {
        match trace.steps.iter().find(|step| step.resubmitted_fresh > 0) {
            Some(step) => Err(InvariantViolation::new(
                self.name(),
                Some(step.time),
                format!("{} messages forwarded twice", step.resubmitted_fresh),
            )),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "IdempotentInput"
    }
}

/// An intermediate tick hint always names the later step that follows.
pub struct IntermediateHintInvariant;

impl Invariant for IntermediateHintInvariant {
    fn check(&self, trace: &RunTrace) -> Result<(), InvariantViolation> {
        for step in &trace.steps {
            if let Some(hint) = step.output.next_tick {
                if hint <= step.time || Some(hint) != step.next_tick {
                    return Err(InvariantViolation::new(
                        self.name(),
                        Some(step.time),
                        format!("hint {hint} differs from next step {:?}", step.next_tick),
                    ));
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "IntermediateHint"
    }
}

/// Returns every invariant a correct run satisfies.
pub fn standard_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(MonotonicStepsInvariant),
        Box::new(HostTicksServicedInvariant),
        Box::new(AlignedResultsInvariant),
        Box::new(IdempotentInputInvariant),
        Box::new(IntermediateHintInvariant),
    ]
}

#[cfg(test)]
mod tests {
    use cosync_core::OutputMap;

    use super::*;

    fn step(time: Tick, host_result: bool) -> StepRecord {
        StepRecord {
            time,
            next_tick: None,
            host_result,
            output: OutputMap::default(),
            rejected: 0,
            resubmitted_fresh: 0,
        }
    }

    fn host(tick: Tick, aligned: bool) -> HostTickRecord {
        HostTickRecord {
            tick,
            aligned,
            received_input: aligned,
            declared_next: None,
            results: 0,
            published: aligned,
        }
    }

    fn trace(schedule: &[Tick], host_ticks: Vec<HostTickRecord>, steps: Vec<StepRecord>) -> RunTrace {
        RunTrace {
            host_schedule: TickSchedule::fixed(schedule.iter().copied()).unwrap(),
            end_tick: 3600,
            host_ticks,
            steps,
        }
    }

    #[test]
    fn test_monotonic_steps_detects_repeat() {
        let ok = trace(&[0], vec![], vec![step(0, true), step(900, false)]);
        assert!(MonotonicStepsInvariant.check(&ok).is_ok());

        let bad = trace(&[0], vec![], vec![step(0, true), step(900, false), step(900, false)]);
        let violation = MonotonicStepsInvariant.check(&bad).unwrap_err();
        assert_eq!(violation.tick, Some(900));
    }

    #[test]
    fn test_unserviced_host_tick_detected() {
        let run = trace(
            &[0, 1000],
            vec![host(0, true), host(1000, false)],
            vec![step(0, true), step(900, false), step(1800, false)],
        );

        let violation = HostTicksServicedInvariant.check(&run).unwrap_err();
        assert_eq!(violation.tick, Some(1000));
        assert!(violation.to_string().contains("HostTicksServiced"));
    }

    #[test]
    fn test_missing_aligned_result_detected() {
        let run = trace(&[0], vec![host(0, true)], vec![step(0, false)]);
        assert!(AlignedResultsInvariant.check(&run).is_err());
    }
}
