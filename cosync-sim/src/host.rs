//! Scripted host simulator.
//!
//! Follows a fixed tick schedule and answers every input with a simple
//! echo model: participant power is reported back, the node voltage sags
//! with total load, flexibility bands are aggregated per receiver.

use std::collections::BTreeMap;
use std::sync::Arc;

use cosync_core::container::{FlexOptionsResult, NodeResult, PowerResult};
use cosync_core::messages::{FlexBand, SetPoint};
use cosync_core::{
    CosyncError, DataCategory, EntityMapping, InitKind, InitializationData, InputContainer,
    ResultContainer, ResultData, SimulationParameters, SyncError, Synchronizer, Tick,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::deterministic::TickSchedule;

/// Voltage drop in per-unit for each MW of total load.
const VOLTAGE_SENSITIVITY: f64 = 0.01;

/// What the host did at one of its ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTickRecord {
    /// Host tick
    pub tick: Tick,
    /// Host met the external side at this tick
    pub aligned: bool,
    /// Input container received for this tick
    pub received_input: bool,
    /// Next tick the host declared
    pub declared_next: Option<Tick>,
    /// Entries in the published result
    pub results: usize,
    /// Result reached the result queue
    pub published: bool,
}

/// Host side of a scenario run.
pub struct ScriptedHost {
    synchronizer: Arc<Synchronizer>,
    schedule: TickSchedule,
    power: BTreeMap<Uuid, PowerResult>,
    set_points: BTreeMap<Uuid, SetPoint>,
}

impl ScriptedHost {
    /// Creates a host following `schedule`.
    pub fn new(synchronizer: Arc<Synchronizer>, schedule: TickSchedule) -> Self {
        Self {
            synchronizer,
            schedule,
            power: BTreeMap::new(),
            set_points: BTreeMap::new(),
        }
    }

    /// Runs the whole schedule, returning one record per processed tick.
    ///
    /// Stops early without error when the synchronizer is closed.
    ///
    /// # Errors
    ///
    /// - `CosyncError::Sync` - Handshake closed before initialization or protocol violated
    pub fn run(mut self) -> Result<Vec<HostTickRecord>, CosyncError> {
        let parameters = match self
            .synchronizer
            .take_initialization_data(InitKind::Parameters)?
        {
            InitializationData::Parameters(parameters) => parameters,
            InitializationData::Mapping(_) => return Err(SyncError::HandshakeClosed.into()),
        };
        let mapping = match self.synchronizer.take_initialization_data(InitKind::Mapping)? {
            InitializationData::Mapping(mapping) => mapping,
            InitializationData::Parameters(_) => return Err(SyncError::HandshakeClosed.into()),
        };
        info!(
            step_size = parameters.step_size,
            ticks = self.schedule.len(),
            "Host initialized"
        );

        let mut records = Vec::with_capacity(self.schedule.len());
        let ticks = self.schedule.ticks().to_vec();
        for tick in ticks {
            match self.synchronizer.advance_host_tick(tick) {
                Err(SyncError::Closed) => {
                    debug!(tick, "Synchronizer closed, host stops");
                    break;
                }
                other => other?,
            }
            records.push(self.process_tick(tick, &parameters, &mapping));
        }

        Ok(records)
    }

    fn process_tick(
        &mut self,
        tick: Tick,
        parameters: &SimulationParameters,
        mapping: &Arc<EntityMapping>,
    ) -> HostTickRecord {
        let aligned = !self.synchronizer.is_finished();
        let input = if aligned {
            self.synchronizer.receive_input()
        } else {
            None
        };
        let received_input = input.is_some();

        let results = self.compute(tick, input.as_ref(), parameters, mapping);
        let declared_next = self.schedule.next_after(tick);
        self.synchronizer.declare_next_host_tick(declared_next);

        let entries = results.len();
        let published = self
            .synchronizer
            .publish_result(results.with_next_tick(declared_next));
        if !published {
            warn!(tick, entries, "Result queue full, host result dropped");
        }
        debug!(tick, aligned, received_input, ?declared_next, "Host tick processed");

        HostTickRecord {
            tick,
            aligned,
            received_input,
            declared_next,
            results: entries,
            published,
        }
    }

    fn compute(
        &mut self,
        tick: Tick,
        input: Option<&InputContainer>,
        parameters: &SimulationParameters,
        mapping: &EntityMapping,
    ) -> ResultContainer {
        let mut results = ResultContainer::new(tick);

        if let Some(input) = input {
            for (id, value) in &input.primary {
                self.power.insert(
                    *id,
                    PowerResult {
                        p: value.p.unwrap_or_default(),
                        q: value.q.unwrap_or_default(),
                    },
                );
            }
            if parameters.set_points_enabled {
                self.set_points.extend(input.set_points.iter().map(|(id, sp)| (*id, *sp)));
            }
        }

        for (id, power) in &self.power {
            if mapping.external_id(DataCategory::ParticipantResult, id).is_some() {
                results.insert(*id, ResultData::Participant(*power));
            }
        }

        if parameters.grid_results_requested {
            let total_p: f64 = self.power.values().map(|power| power.p).sum();
            for node in mapping.internal_ids(DataCategory::GridResult) {
                results.insert(
                    *node,
                    ResultData::Grid(NodeResult {
                        v_mag: 1.0 - VOLTAGE_SENSITIVITY * total_p,
                        v_ang: 0.0,
                    }),
                );
            }
        }

        for (id, set_point) in &self.set_points {
            results.insert(*id, ResultData::SetPoint(*set_point));
        }

        if let (true, Some(input)) = (parameters.flexibility_enabled, input) {
            for (receiver, target) in &input.flex_requests {
                results.insert(*receiver, ResultData::FlexRequest { target: *target });
            }
            for (receiver, contributions) in &input.flex_options {
                let bands = contributions
                    .iter()
                    .fold(BTreeMap::new(), |mut bands, contribution| {
                        bands
                            .entry(contribution.sender)
                            .and_modify(|band: &mut FlexBand| *band = *band + contribution.band)
                            .or_insert(contribution.band);
                        bands
                    });
                results.insert(*receiver, ResultData::FlexOptions(FlexOptionsResult::aggregate(bands)));
            }
        }

        results
    }
}
