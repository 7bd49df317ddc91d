//! Closed label-to-kind table for step inputs.

use serde_json::Value;

use super::MessageError;
use super::types::{FlexOption, MessageContent, PowerUnit, SetPoint};

const FLEX_REQUEST_LABEL: &str = "FlexRequest";
const FLEX_OPTIONS_LABEL: &str = "FlexOptions";
const FLEX_SET_POINT_LABEL: &str = "FlexSetPoint";

/// Input attribute labels the classifier accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAttribute {
    Measurement(PowerUnit),
    FlexRequest,
    FlexOptions,
    FlexSetPoint,
}

impl InputAttribute {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            FLEX_REQUEST_LABEL => Some(InputAttribute::FlexRequest),
            FLEX_OPTIONS_LABEL => Some(InputAttribute::FlexOptions),
            FLEX_SET_POINT_LABEL => Some(InputAttribute::FlexSetPoint),
            other => PowerUnit::from_label(other).map(InputAttribute::Measurement),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InputAttribute::Measurement(unit) => unit.label(),
            InputAttribute::FlexRequest => FLEX_REQUEST_LABEL,
            InputAttribute::FlexOptions => FLEX_OPTIONS_LABEL,
            InputAttribute::FlexSetPoint => FLEX_SET_POINT_LABEL,
        }
    }
}

/// Classifies one `(label, value)` pair into typed content.
///
/// Null values of any label become [`MessageContent::Withdrawn`]. Sender ids
/// embedded in structured values are returned verbatim; normalization is
/// the parser's job.
///
/// # Errors
///
/// - `MessageError::UnknownAttribute` - Non-null value under a label outside the table
/// - `MessageError::MalformedValue` - Value shape does not match the label
pub fn classify_value(
    receiver: &str,
    label: &str,
    value: &Value,
) -> Result<MessageContent, MessageError> {
    if value.is_null() {
        return Ok(MessageContent::Withdrawn {
            attribute: label.to_string(),
        });
    }

    let attribute =
        InputAttribute::from_label(label).ok_or_else(|| MessageError::UnknownAttribute {
            receiver: receiver.to_string(),
            attribute: label.to_string(),
        })?;
    let malformed = |reason: String| MessageError::MalformedValue {
        receiver: receiver.to_string(),
        attribute: label.to_string(),
        reason,
    };

    match attribute {
        InputAttribute::Measurement(unit) => value
            .as_f64()
            .map(|value| MessageContent::Measurement { unit, value })
            .ok_or_else(|| malformed(format!("expected number, got {value}"))),
        InputAttribute::FlexRequest => value
            .get("sender")
            .and_then(Value::as_str)
            .map(|target| MessageContent::FlexRequest {
                target: target.to_string(),
            })
            .ok_or_else(|| malformed("expected object with string 'sender'".to_string())),
        InputAttribute::FlexOptions => {
            let options = match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| serde_json::from_value::<FlexOption>(item.clone()))
                    .collect::<Result<Vec<_>, _>>(),
                Value::Object(_) => serde_json::from_value::<FlexOption>(value.clone())
                    .map(|option| vec![option]),
                other => return Err(malformed(format!("expected object or array, got {other}"))),
            };
            options
                .map(MessageContent::FlexOptions)
                .map_err(|e| malformed(e.to_string()))
        }
        InputAttribute::FlexSetPoint => serde_json::from_value::<SetPoint>(value.clone())
            .map(MessageContent::SetPoint)
            .map_err(|e| malformed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::messages::types::FlexBand;

    #[test]
    fn test_numeric_labels_classify_as_measurement() {
        let content = classify_value("load_1", "P[kW]", &json!(120.0)).unwrap();
        assert_eq!(
            content,
            MessageContent::Measurement {
                unit: PowerUnit::KiloWatt,
                value: 120.0
            }
        );

        let err = classify_value("load_1", "Q[MVAr]", &json!("high")).unwrap_err();
        assert!(matches!(err, MessageError::MalformedValue { .. }));
    }

    #[test]
    fn test_null_is_withdrawn_even_for_unknown_label() {
        let content = classify_value("load_1", "Vm[pu]", &Value::Null).unwrap();
        assert_eq!(
            content,
            MessageContent::Withdrawn {
                attribute: "Vm[pu]".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_label_rejected() {
        let err = classify_value("load_1", "Temperature", &json!(21.5)).unwrap_err();
        assert_eq!(
            err,
            MessageError::UnknownAttribute {
                receiver: "load_1".to_string(),
                attribute: "Temperature".to_string(),
            }
        );
    }

    #[test]
    fn test_flex_shapes() {
        let request = classify_value("em_1", "FlexRequest", &json!({"sender": "em_2"})).unwrap();
        assert_eq!(
            request,
            MessageContent::FlexRequest {
                target: "em_2".to_string()
            }
        );

        let single = classify_value(
            "em_1",
            "FlexOptions",
            &json!({"sender": "em_2", "pMin": 0.0, "pRef": 1.0, "pMax": 2.0}),
        )
        .unwrap();
        let MessageContent::FlexOptions(options) = single else {
            panic!("expected flex options");
        };
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].band, FlexBand::new(0.0, 1.0, 2.0));

        let many = classify_value(
            "em_1",
            "FlexOptions",
            &json!([
                {"sender": "em_2", "pMin": 0.0, "pRef": 1.0, "pMax": 2.0},
                {"sender": "em_3", "pMin": -1.0, "pRef": 0.0, "pMax": 1.0}
            ]),
        )
        .unwrap();
        assert!(matches!(many, MessageContent::FlexOptions(ref o) if o.len() == 2));

        let set_point = classify_value("em_1", "FlexSetPoint", &json!({"p": 0.4})).unwrap();
        assert_eq!(
            set_point,
            MessageContent::SetPoint(SetPoint { p: 0.4, q: None })
        );
    }

    #[test]
    fn test_malformed_flex_values() {
        assert!(classify_value("em_1", "FlexRequest", &json!({"target": "em_2"})).is_err());
        assert!(classify_value("em_1", "FlexOptions", &json!(3.0)).is_err());
        assert!(classify_value("em_1", "FlexOptions", &json!([{"sender": "em_2"}])).is_err());
        assert!(classify_value("em_1", "FlexSetPoint", &json!({"q": 1.0})).is_err());
    }

    #[test]
    fn test_label_round_trip() {
        for label in ["P[MW]", "Q[kVAr]", "FlexRequest", "FlexOptions", "FlexSetPoint"] {
            let attribute = InputAttribute::from_label(label).unwrap();
            assert_eq!(attribute.label(), label);
        }
    }
}
