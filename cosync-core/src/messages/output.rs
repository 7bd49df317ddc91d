//! Translates host results into the nested output map a requester asked for.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::MessageError;
use super::types::{FlexBand, PowerUnit, Quantity};
use crate::Tick;
use crate::container::{FlexOptionsResult, ResultContainer, ResultData};
use crate::mapping::{DataCategory, EntityMapping};

/// Output request shape: `receiver -> requested attribute labels`.
pub type OutputRequest = BTreeMap<String, Vec<String>>;

const NEXT_TICK_KEY: &str = "nextTick";

/// Nominal voltage in per-unit, reported before any power flow has run.
const NOMINAL_VOLTAGE_PU: f64 = 1.0;

/// Output attribute labels the translator can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputAttribute {
    VoltageMagnitude,
    VoltageDeviation,
    Power(PowerUnit),
    FlexMin,
    FlexRef,
    FlexMax,
    /// Flex bands keyed by contributing entity
    FlexBreakdown,
    FlexRequest,
}

impl OutputAttribute {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Vm[pu]" => Some(OutputAttribute::VoltageMagnitude),
            "Delta_U[pu]" => Some(OutputAttribute::VoltageDeviation),
            "P_min[MW]" => Some(OutputAttribute::FlexMin),
            "P_ref[MW]" => Some(OutputAttribute::FlexRef),
            "P_max[MW]" => Some(OutputAttribute::FlexMax),
            "FlexOptions" => Some(OutputAttribute::FlexBreakdown),
            "FlexRequest" => Some(OutputAttribute::FlexRequest),
            other => PowerUnit::from_label(other).map(OutputAttribute::Power),
        }
    }
}

/// Nested output for one step, with an optional intermediate tick hint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputMap {
    pub entities: BTreeMap<String, BTreeMap<String, Value>>,
    pub next_tick: Option<Tick>,
}

impl OutputMap {
    pub fn value(&self, receiver: &str, attribute: &str) -> Option<&Value> {
        self.entities
            .get(receiver)
            .and_then(|attributes| attributes.get(attribute))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.next_tick.is_none()
    }

    /// Renders the wire shape, with a top-level `nextTick` key when set.
    pub fn to_json(&self) -> Value {
        let mut root: Map<String, Value> = self
            .entities
            .iter()
            .map(|(receiver, attributes)| {
                let attributes: Map<String, Value> = attributes
                    .iter()
                    .map(|(label, value)| (label.clone(), value.clone()))
                    .collect();
                (receiver.clone(), Value::Object(attributes))
            })
            .collect();

        if let Some(next_tick) = self.next_tick {
            root.insert(NEXT_TICK_KEY.to_string(), json!(next_tick));
        }
        Value::Object(root)
    }
}

/// Builds output maps from result containers.
pub struct OutputTranslator<'m> {
    mapping: &'m EntityMapping,
}

impl<'m> OutputTranslator<'m> {
    pub fn new(mapping: &'m EntityMapping) -> Self {
        Self { mapping }
    }

    /// Checks every requested label against the output table.
    ///
    /// # Errors
    ///
    /// - `MessageError::UnknownAttribute` - First label outside the output table
    pub fn validate_request(request: &OutputRequest) -> Result<(), MessageError> {
        for (receiver, labels) in request {
            if let Some(label) = labels
                .iter()
                .find(|label| OutputAttribute::from_label(label).is_none())
            {
                return Err(MessageError::UnknownAttribute {
                    receiver: receiver.clone(),
                    attribute: label.clone(),
                });
            }
        }
        Ok(())
    }

    /// Produces one value per requested `(receiver, label)` pair.
    ///
    /// Receivers without a mapping and pairs the result kind cannot answer
    /// are logged and left out.
    ///
    /// # Errors
    ///
    /// - `MessageError::UnknownAttribute` - Requested label outside the output table
    pub fn translate(
        &self,
        results: &ResultContainer,
        request: &OutputRequest,
    ) -> Result<OutputMap, MessageError> {
        let mut output = OutputMap::default();

        for (receiver, labels) in request {
            let Some(id) = self.resolve_receiver(receiver) else {
                warn!(tick = results.tick, %receiver, "No mapping for requested output receiver");
                continue;
            };
            let result = results.get(&id);

            for label in labels {
                let attribute = OutputAttribute::from_label(label).ok_or_else(|| {
                    MessageError::UnknownAttribute {
                        receiver: receiver.clone(),
                        attribute: label.clone(),
                    }
                })?;

                if let Some(value) = self.attribute_value(results.tick, receiver, attribute, result)
                {
                    output
                        .entities
                        .entry(receiver.clone())
                        .or_default()
                        .insert(label.clone(), value);
                }
            }
        }

        Ok(output)
    }

    fn resolve_receiver(&self, receiver: &str) -> Option<uuid::Uuid> {
        self.mapping
            .find_result_id(receiver)
            .map(|(_, id)| id)
            .or_else(|| self.mapping.internal_id(DataCategory::FlexInput, receiver))
    }

    fn attribute_value(
        &self,
        tick: Tick,
        receiver: &str,
        attribute: OutputAttribute,
        result: Option<&ResultData>,
    ) -> Option<Value> {
        match (attribute, result) {
            (OutputAttribute::VoltageDeviation, _) if tick == 0 => Some(Value::from(0.0)),
            (OutputAttribute::VoltageMagnitude, None) if tick == 0 => {
                Some(Value::from(NOMINAL_VOLTAGE_PU))
            }
            (OutputAttribute::VoltageMagnitude, Some(ResultData::Grid(node))) => {
                Some(Value::from(node.v_mag))
            }
            (OutputAttribute::VoltageDeviation, Some(ResultData::Grid(node))) => {
                Some(Value::from(node.v_mag - NOMINAL_VOLTAGE_PU))
            }
            (OutputAttribute::Power(unit), Some(ResultData::Participant(power))) => {
                let base = match unit.quantity() {
                    Quantity::ActivePower => power.p,
                    Quantity::ReactivePower => power.q,
                };
                Some(Value::from(unit.from_base(base)))
            }
            (OutputAttribute::Power(unit), Some(ResultData::SetPoint(set_point))) => {
                let base = match unit.quantity() {
                    Quantity::ActivePower => Some(set_point.p),
                    Quantity::ReactivePower => set_point.q,
                };
                base.map(|value| Value::from(unit.from_base(value)))
            }
            (OutputAttribute::FlexMin, Some(ResultData::FlexOptions(flex))) => {
                Some(Value::from(flex.total.p_min))
            }
            (OutputAttribute::FlexRef, Some(ResultData::FlexOptions(flex))) => {
                Some(Value::from(flex.total.p_ref))
            }
            (OutputAttribute::FlexMax, Some(ResultData::FlexOptions(flex))) => {
                Some(Value::from(flex.total.p_max))
            }
            (OutputAttribute::FlexBreakdown, Some(ResultData::FlexOptions(flex))) => {
                Some(self.flex_breakdown(receiver, flex))
            }
            (OutputAttribute::FlexRequest, Some(ResultData::FlexRequest { target })) => self
                .mapping
                .external_id(DataCategory::FlexInput, target)
                .map(|target| Value::from(target.to_string())),
            (attribute, None) => {
                debug!(tick, %receiver, ?attribute, "No result for requested receiver");
                None
            }
            (attribute, Some(other)) => {
                warn!(
                    tick,
                    %receiver,
                    ?attribute,
                    kind = other.kind(),
                    "Requested attribute not provided by result kind"
                );
                None
            }
        }
    }

    fn flex_breakdown(&self, receiver: &str, flex: &FlexOptionsResult) -> Value {
        if flex.contributions.is_empty() {
            let mut single = Map::new();
            single.insert(receiver.to_string(), band_json(&flex.total));
            return Value::Object(single);
        }

        let entries: Map<String, Value> = flex
            .contributions
            .iter()
            .map(|(id, band)| {
                let key = self
                    .mapping
                    .any_external_id(id)
                    .map_or_else(|| id.to_string(), str::to_string);
                (key, band_json(band))
            })
            .collect();
        Value::Object(entries)
    }
}

fn band_json(band: &FlexBand) -> Value {
    json!({
        "pMin": band.p_min,
        "pRef": band.p_ref,
        "pMax": band.p_max,
    })
}
