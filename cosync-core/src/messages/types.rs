//! Typed message content produced by input classification.

use serde::{Deserialize, Serialize};

/// Physical quantity carried by a numeric measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantity {
    ActivePower,
    ReactivePower,
}

/// Unit attached to a numeric power value.
///
/// Values are normalized to MW / MVAr when merged into containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerUnit {
    MegaWatt,
    KiloWatt,
    MegaVar,
    KiloVar,
}

impl PowerUnit {
    pub fn quantity(self) -> Quantity {
        match self {
            PowerUnit::MegaWatt | PowerUnit::KiloWatt => Quantity::ActivePower,
            PowerUnit::MegaVar | PowerUnit::KiloVar => Quantity::ReactivePower,
        }
    }

    /// Converts a value in this unit to MW or MVAr.
    pub fn to_base(self, value: f64) -> f64 {
        match self {
            PowerUnit::MegaWatt | PowerUnit::MegaVar => value,
            PowerUnit::KiloWatt | PowerUnit::KiloVar => value / 1000.0,
        }
    }

    /// Converts a value in MW or MVAr to this unit.
    pub fn from_base(self, value: f64) -> f64 {
        match self {
            PowerUnit::MegaWatt | PowerUnit::MegaVar => value,
            PowerUnit::KiloWatt | PowerUnit::KiloVar => value * 1000.0,
        }
    }

    /// Wire label of a numeric attribute in this unit.
    pub fn label(self) -> &'static str {
        match self {
            PowerUnit::MegaWatt => "P[MW]",
            PowerUnit::KiloWatt => "P[kW]",
            PowerUnit::MegaVar => "Q[MVAr]",
            PowerUnit::KiloVar => "Q[kVAr]",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "P[MW]" => Some(PowerUnit::MegaWatt),
            "P[kW]" => Some(PowerUnit::KiloWatt),
            "Q[MVAr]" => Some(PowerUnit::MegaVar),
            "Q[kVAr]" => Some(PowerUnit::KiloVar),
            _ => None,
        }
    }
}

/// Offered active power band in MW.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlexBand {
    #[serde(rename = "pMin")]
    pub p_min: f64,
    #[serde(rename = "pRef")]
    pub p_ref: f64,
    #[serde(rename = "pMax")]
    pub p_max: f64,
}

impl FlexBand {
    pub fn new(p_min: f64, p_ref: f64, p_max: f64) -> Self {
        Self {
            p_min,
            p_ref,
            p_max,
        }
    }

    /// Returns true if the reference lies within the band.
    pub fn is_consistent(&self) -> bool {
        self.p_min <= self.p_ref && self.p_ref <= self.p_max
    }
}

impl std::ops::Add for FlexBand {
    type Output = FlexBand;

    fn add(self, other: FlexBand) -> FlexBand {
        FlexBand::new(
            self.p_min + other.p_min,
            self.p_ref + other.p_ref,
            self.p_max + other.p_max,
        )
    }
}

/// Flexibility band offered by one sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexOption {
    pub sender: String,
    #[serde(flatten)]
    pub band: FlexBand,
}

/// Commanded operating point in MW / MVAr.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetPoint {
    pub p: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<f64>,
}

/// Closed set of content kinds a classified input can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageContent {
    /// Plain numeric value
    Measurement { unit: PowerUnit, value: f64 },
    /// Receiver asks `target` for its flexibility
    FlexRequest { target: String },
    /// Flexibility bands addressed to the receiver
    FlexOptions(Vec<FlexOption>),
    /// Operating point command for the receiver
    SetPoint(SetPoint),
    /// Explicit null: the sender withdrew a previously sent value
    Withdrawn { attribute: String },
}

impl MessageContent {
    /// Returns string representation of the content kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::Measurement { .. } => "Measurement",
            MessageContent::FlexRequest { .. } => "FlexRequest",
            MessageContent::FlexOptions(_) => "FlexOptions",
            MessageContent::SetPoint(_) => "SetPoint",
            MessageContent::Withdrawn { .. } => "Withdrawn",
        }
    }
}

/// One classified unit of external input for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub receiver: String,
    pub sender: Option<String>,
    pub content: MessageContent,
}

impl ParsedMessage {
    pub fn new(receiver: impl Into<String>, sender: Option<String>, content: MessageContent) -> Self {
        Self {
            receiver: receiver.into(),
            sender,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion_to_base() {
        assert_eq!(PowerUnit::KiloWatt.to_base(1500.0), 1.5);
        assert_eq!(PowerUnit::MegaVar.to_base(2.0), 2.0);
        assert_eq!(PowerUnit::KiloVar.from_base(0.25), 250.0);
        assert_eq!(PowerUnit::KiloWatt.quantity(), Quantity::ActivePower);
        assert_eq!(PowerUnit::KiloVar.quantity(), Quantity::ReactivePower);
    }

    #[test]
    fn test_unit_labels_are_bijective() {
        for unit in [
            PowerUnit::MegaWatt,
            PowerUnit::KiloWatt,
            PowerUnit::MegaVar,
            PowerUnit::KiloVar,
        ] {
            assert_eq!(PowerUnit::from_label(unit.label()), Some(unit));
        }
        assert_eq!(PowerUnit::from_label("P[GW]"), None);
    }

    #[test]
    fn test_flex_option_wire_shape() {
        let option: FlexOption = serde_json::from_value(serde_json::json!({
            "sender": "em_1",
            "pMin": -1.0,
            "pRef": 0.5,
            "pMax": 2.0
        }))
        .unwrap();

        assert_eq!(option.sender, "em_1");
        assert_eq!(option.band, FlexBand::new(-1.0, 0.5, 2.0));
        assert!(option.band.is_consistent());
    }
}
