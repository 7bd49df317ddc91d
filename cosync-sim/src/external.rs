//! Scripted external engine.

use cosync_core::messages::OutputRequest;
use cosync_core::{CosyncError, ExternalAdapter, OutputMap, SimulationParameters, Tick};
use tracing::{debug, info, warn};

use crate::deterministic::DeterministicRng;
use crate::fixtures::demo_input;

/// What the external engine observed at one of its steps.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    /// External time of the step
    pub time: Tick,
    /// Tick requested for the following step
    pub next_tick: Option<Tick>,
    /// Host result for this time was received
    pub host_result: bool,
    /// Translated output
    pub output: OutputMap,
    /// Number of input values rejected by the classifier
    pub rejected: usize,
    /// Messages a resubmission of the same input would have forwarded again
    pub resubmitted_fresh: usize,
}

/// External side of a scenario run.
///
/// Starts at time 0 and follows [`ExternalAdapter::step`]'s next tick until
/// it passes `end_tick`.
pub struct ScriptedExternal {
    adapter: ExternalAdapter,
    rng: DeterministicRng,
    end_tick: Tick,
    flexibility: bool,
    request: OutputRequest,
    /// Resubmit each step's input once more, as engines do when re-sending
    /// an unchanged state within one step
    resubmit: bool,
}

impl ScriptedExternal {
    /// Creates an external engine stepping until `end_tick`.
    pub fn new(
        adapter: ExternalAdapter,
        rng: DeterministicRng,
        end_tick: Tick,
        request: OutputRequest,
    ) -> Self {
        Self {
            adapter,
            rng,
            end_tick,
            flexibility: false,
            request,
            resubmit: false,
        }
    }

    /// Generates flexibility messages in every step.
    pub fn with_flexibility(mut self, enabled: bool) -> Self {
        self.flexibility = enabled;
        self
    }

    /// Feeds every step's input twice.
    pub fn with_resubmission(mut self, enabled: bool) -> Self {
        self.resubmit = enabled;
        self
    }

    /// Initializes the host and runs all steps.
    ///
    /// # Errors
    ///
    /// - `CosyncError::Sync` - Initialization failed or tick ordering violated
    /// - `CosyncError::Message` - Output request names an unknown attribute
    pub fn run(mut self, parameters: SimulationParameters) -> Result<Vec<StepRecord>, CosyncError> {
        self.adapter.initialize(parameters)?;

        let mut records = Vec::new();
        let mut time: Tick = 0;
        loop {
            let raw = demo_input(&mut self.rng, time, self.flexibility);
            let step = self.adapter.step(time, &raw, &self.request)?;

            let resubmitted_fresh = if self.resubmit {
                let repeated = self.adapter.prepare_input(time, &raw);
                if repeated.fresh_messages > 0 {
                    warn!(time, fresh = repeated.fresh_messages, "Resubmitted input not deduplicated");
                }
                repeated.fresh_messages
            } else {
                0
            };

            debug!(
                time,
                next_tick = ?step.next_tick,
                host_result = step.host_result,
                "External step done"
            );
            records.push(StepRecord {
                time,
                next_tick: step.next_tick,
                host_result: step.host_result,
                rejected: step.rejected.len(),
                resubmitted_fresh,
                output: step.output,
            });

            match step.next_tick {
                Some(next) if next <= self.end_tick => time = next,
                _ => break,
            }
        }

        info!(steps = records.len(), end_tick = self.end_tick, "External side finished");
        Ok(records)
    }
}
