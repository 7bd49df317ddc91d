//! External-side step driver.
//!
//! Wraps the [`Synchronizer`] with the per-step sequence an external engine
//! runs: advance time, forward fresh input, collect the host's result and
//! translate it into the requested output shape.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::CosyncConfig;
use crate::container::{InputContainer, InputContainerBuilder, ResultContainer};
use crate::mapping::EntityMapping;
use crate::messages::{
    MessageError, MessageParser, OutputMap, OutputRequest, OutputTranslator, RawInputMap,
};
use crate::sync::{InitializationData, SimulationParameters, Synchronizer};
use crate::{CosyncError, Tick};

/// Input of one step after parsing, deduplication and id translation.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub container: InputContainer,
    /// Messages not already forwarded earlier in the same tick
    pub fresh_messages: usize,
    pub rejected: Vec<MessageError>,
}

/// Outcome of one external step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub time: Tick,
    pub output: OutputMap,
    /// Tick the external engine should step to next
    pub next_tick: Option<Tick>,
    /// Input values the classifier refused
    pub rejected: Vec<MessageError>,
    /// Whether a host result for `time` was received
    pub host_result: bool,
}

/// Drives the external side of one synchronized run.
pub struct ExternalAdapter {
    synchronizer: Arc<Synchronizer>,
    mapping: Arc<EntityMapping>,
    parser: MessageParser,
    poll_interval: Duration,
}

impl ExternalAdapter {
    pub fn new(
        synchronizer: Arc<Synchronizer>,
        mapping: Arc<EntityMapping>,
        config: &CosyncConfig,
    ) -> Self {
        Self {
            synchronizer,
            mapping,
            parser: MessageParser::new(&config.parser),
            poll_interval: config.sync.poll_interval,
        }
    }

    /// Configures the step size and hands parameters and mapping to the host.
    ///
    /// # Errors
    ///
    /// - `CosyncError::Sync` - Step size invalid or handshake unavailable
    pub fn initialize(&self, parameters: SimulationParameters) -> Result<(), CosyncError> {
        self.synchronizer.set_step_size(parameters.step_size)?;
        info!(
            step_size = parameters.step_size,
            flexibility = parameters.flexibility_enabled,
            set_points = parameters.set_points_enabled,
            "Initializing external side"
        );

        self.synchronizer
            .push_initialization_data(InitializationData::Parameters(parameters))?;
        self.synchronizer
            .push_initialization_data(InitializationData::Mapping(Arc::clone(&self.mapping)))?;
        Ok(())
    }

    /// Parses `raw`, drops messages already forwarded in `tick` and builds
    /// the host container.
    pub fn prepare_input(&self, tick: Tick, raw: &RawInputMap) -> PreparedInput {
        let parsed = self.parser.parse(raw);
        let fresh = self.synchronizer.filter_unseen(tick, parsed.messages);

        let mut builder =
            InputContainerBuilder::new(&self.mapping, tick, self.synchronizer.next_tick());
        builder.extend(&fresh);
        debug!(
            tick,
            fresh = fresh.len(),
            applied = builder.applied(),
            rejected = parsed.rejected.len(),
            "Prepared step input"
        );

        PreparedInput {
            container: builder.build(),
            fresh_messages: fresh.len(),
            rejected: parsed.rejected,
        }
    }

    /// Runs one external step at `time`.
    ///
    /// Blocks while the host still has to reach `time`. Missing host results
    /// leave the output empty, except for the nominal defaults at tick 0.
    /// The request is checked before time advances, so a rejected step can
    /// be retried.
    ///
    /// # Errors
    ///
    /// - `CosyncError::Sync` - Tick ordering violated or step size unset
    /// - `CosyncError::Message` - Output request names an unknown attribute
    pub fn step(
        &self,
        time: Tick,
        raw: &RawInputMap,
        request: &OutputRequest,
    ) -> Result<StepOutput, CosyncError> {
        OutputTranslator::validate_request(request)?;
        self.synchronizer.advance_external_tick(time)?;

        let prepared = self.prepare_input(time, raw);
        if prepared.container.is_empty() {
            self.synchronizer.set_no_input_flag();
        } else if !self.synchronizer.submit_input(prepared.container) {
            warn!(time, "Input submission interrupted, host proceeds without input");
            self.synchronizer.set_no_input_flag();
        }

        if request.is_empty() {
            self.synchronizer.set_no_output_flag();
        }

        let received = self.synchronizer.poll_result(self.poll_interval);
        let host_result = received.is_some();
        let results = received.unwrap_or_else(|| ResultContainer::new(time));

        let mut output = OutputTranslator::new(&self.mapping).translate(&results, request)?;
        let next_tick = self.synchronizer.next_tick();
        if self.synchronizer.should_emit_intermediate_output() {
            debug!(time, ?next_tick, "Requesting intermediate step");
            output.next_tick = next_tick;
        }

        Ok(StepOutput {
            time,
            output,
            next_tick,
            rejected: prepared.rejected,
            host_result,
        })
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    pub fn mapping(&self) -> &Arc<EntityMapping> {
        &self.mapping
    }
}
