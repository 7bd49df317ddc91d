//! External-bound per-tick result aggregate.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Tick;
use crate::messages::{FlexBand, SetPoint};

/// Node voltage produced by the host's power flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// Voltage magnitude in per-unit
    pub v_mag: f64,
    /// Voltage angle in degrees
    pub v_ang: f64,
}

/// Power output of one participant in MW / MVAr.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerResult {
    pub p: f64,
    pub q: f64,
}

/// Flexibility band of an energy manager.
///
/// When the band aggregates several sub-entities, `contributions` holds
/// each one keyed by its internal id and `total` is their sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexOptionsResult {
    pub total: FlexBand,
    pub contributions: BTreeMap<Uuid, FlexBand>,
}

impl FlexOptionsResult {
    pub fn single(band: FlexBand) -> Self {
        Self {
            total: band,
            contributions: BTreeMap::new(),
        }
    }

    /// Builds a result whose total is the sum of its contributions.
    pub fn aggregate(contributions: BTreeMap<Uuid, FlexBand>) -> Self {
        let total = contributions
            .values()
            .copied()
            .fold(FlexBand::new(0.0, 0.0, 0.0), |sum, band| sum + band);
        Self {
            total,
            contributions,
        }
    }
}

/// Typed result object for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultData {
    Grid(NodeResult),
    Participant(PowerResult),
    FlexOptions(FlexOptionsResult),
    SetPoint(SetPoint),
    /// Echo of the flexibility request the entity received
    FlexRequest { target: Uuid },
}

impl ResultData {
    /// Returns string representation of the result kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResultData::Grid(_) => "Grid",
            ResultData::Participant(_) => "Participant",
            ResultData::FlexOptions(_) => "FlexOptions",
            ResultData::SetPoint(_) => "SetPoint",
            ResultData::FlexRequest { .. } => "FlexRequest",
        }
    }
}

/// Results of one host tick, keyed by internal id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultContainer {
    pub tick: Tick,
    pub results: HashMap<Uuid, ResultData>,
    /// Next tick at which the host expects input
    pub next_tick: Option<Tick>,
}

impl ResultContainer {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            results: HashMap::new(),
            next_tick: None,
        }
    }

    pub fn with_next_tick(mut self, next_tick: Option<Tick>) -> Self {
        self.next_tick = next_tick;
        self
    }

    /// Adds a result, replacing an earlier one for the same entity.
    pub fn insert(&mut self, id: Uuid, result: ResultData) -> Option<ResultData> {
        self.results.insert(id, result)
    }

    pub fn get(&self, id: &Uuid) -> Option<&ResultData> {
        self.results.get(id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
