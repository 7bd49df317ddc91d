//! Host-bound per-tick input aggregate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Tick;
use crate::mapping::{DataCategory, EntityMapping};
use crate::messages::{FlexBand, MessageContent, ParsedMessage, Quantity, SetPoint};

/// Merged primary value of one receiver, in MW / MVAr.
///
/// Active and reactive parts arriving on different labels combine into one
/// complex value; repeated values of the same quantity are summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryValue {
    pub p: Option<f64>,
    pub q: Option<f64>,
}

impl PrimaryValue {
    pub fn active(p: f64) -> Self {
        Self {
            p: Some(p),
            q: None,
        }
    }

    pub fn complex(p: f64, q: f64) -> Self {
        Self {
            p: Some(p),
            q: Some(q),
        }
    }

    /// Adds a base-unit value of the given quantity.
    pub fn accumulate(&mut self, quantity: Quantity, value: f64) {
        let slot = match quantity {
            Quantity::ActivePower => &mut self.p,
            Quantity::ReactivePower => &mut self.q,
        };
        *slot = Some(slot.unwrap_or(0.0) + value);
    }

    /// Returns true if both active and reactive parts are present.
    pub fn is_complex(&self) -> bool {
        self.p.is_some() && self.q.is_some()
    }
}

/// Flexibility band offered by an addressed sender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlexContribution {
    pub sender: Uuid,
    pub band: FlexBand,
}

/// Input for the host at one tick, keyed by internal id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputContainer {
    pub tick: Tick,
    /// Next tick the external side will step to
    pub next_tick: Option<Tick>,
    pub primary: HashMap<Uuid, PrimaryValue>,
    /// Receiver to the entity it requests flexibility from
    pub flex_requests: HashMap<Uuid, Uuid>,
    pub flex_options: HashMap<Uuid, Vec<FlexContribution>>,
    pub set_points: HashMap<Uuid, SetPoint>,
}

impl InputContainer {
    pub fn new(tick: Tick, next_tick: Option<Tick>) -> Self {
        Self {
            tick,
            next_tick,
            primary: HashMap::new(),
            flex_requests: HashMap::new(),
            flex_options: HashMap::new(),
            set_points: HashMap::new(),
        }
    }

    /// Returns true if the container carries no data for the host.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
            && self.flex_requests.is_empty()
            && self.flex_options.is_empty()
            && self.set_points.is_empty()
    }

    /// Returns every receiver addressed by this container.
    pub fn receivers(&self) -> impl Iterator<Item = &Uuid> {
        self.primary
            .keys()
            .chain(self.flex_requests.keys())
            .chain(self.flex_options.keys())
            .chain(self.set_points.keys())
    }
}

/// Builds an [`InputContainer`] from parsed messages, translating ids.
///
/// Messages whose receiver or sender is not mapped are logged and dropped.
pub struct InputContainerBuilder<'m> {
    mapping: &'m EntityMapping,
    container: InputContainer,
    applied: usize,
}

impl<'m> InputContainerBuilder<'m> {
    pub fn new(mapping: &'m EntityMapping, tick: Tick, next_tick: Option<Tick>) -> Self {
        Self {
            mapping,
            container: InputContainer::new(tick, next_tick),
            applied: 0,
        }
    }

    /// Applies one message, returning true if it changed the container.
    pub fn push(&mut self, message: &ParsedMessage) -> bool {
        let applied = match &message.content {
            MessageContent::Measurement { unit, value } => {
                self.resolve(DataCategory::PrimaryInput, &message.receiver)
                    .is_some_and(|receiver| {
                        self.container
                            .primary
                            .entry(receiver)
                            .or_default()
                            .accumulate(unit.quantity(), unit.to_base(*value));
                        true
                    })
            }
            MessageContent::FlexRequest { target } => self.push_flex_request(message, target),
            MessageContent::FlexOptions(options) => {
                let Some(receiver) = self.resolve(DataCategory::FlexInput, &message.receiver)
                else {
                    return false;
                };
                let contributions: Vec<_> = options
                    .iter()
                    .filter_map(|option| {
                        self.resolve(DataCategory::FlexInput, &option.sender)
                            .map(|sender| FlexContribution {
                                sender,
                                band: option.band,
                            })
                    })
                    .collect();
                if contributions.is_empty() {
                    false
                } else {
                    self.container
                        .flex_options
                        .entry(receiver)
                        .or_default()
                        .extend(contributions);
                    true
                }
            }
            MessageContent::SetPoint(set_point) => {
                let Some(receiver) = self.resolve(DataCategory::FlexInput, &message.receiver)
                else {
                    return false;
                };
                if self.container.set_points.contains_key(&receiver) {
                    warn!(
                        tick = self.container.tick,
                        receiver = %message.receiver,
                        sender = ?message.sender,
                        "Multiple set-points for one receiver, keeping the first"
                    );
                    false
                } else {
                    self.container.set_points.insert(receiver, *set_point);
                    true
                }
            }
            MessageContent::Withdrawn { attribute } => {
                debug!(
                    tick = self.container.tick,
                    receiver = %message.receiver,
                    %attribute,
                    "Value withdrawn"
                );
                false
            }
        };

        if applied {
            self.applied += 1;
        }
        applied
    }

    /// Applies every message in order.
    pub fn extend<'a, I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = &'a ParsedMessage>,
    {
        for message in messages {
            self.push(message);
        }
    }

    /// Returns number of messages that changed the container.
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn build(self) -> InputContainer {
        self.container
    }

    fn push_flex_request(&mut self, message: &ParsedMessage, target: &str) -> bool {
        let Some(receiver) = self.resolve(DataCategory::FlexInput, &message.receiver) else {
            return false;
        };
        let Some(target) = self.resolve(DataCategory::FlexInput, target) else {
            return false;
        };

        if let Some(existing) = self.container.flex_requests.get(&receiver) {
            warn!(
                tick = self.container.tick,
                receiver = %message.receiver,
                kept = %existing,
                ignored = %target,
                "Multiple flex request senders for one receiver, keeping the first"
            );
            return false;
        }
        self.container.flex_requests.insert(receiver, target);
        true
    }

    fn resolve(&self, category: DataCategory, external_id: &str) -> Option<Uuid> {
        match self.mapping.require_internal_id(category, external_id) {
            Ok(id) => Some(id),
            Err(error) => {
                warn!(tick = self.container.tick, %error, "Dropping message for unmapped entity");
                None
            }
        }
    }
}
