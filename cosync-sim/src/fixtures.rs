//! Demo grid used by scenarios: two loads, one node and two energy managers.

use std::collections::BTreeMap;

use cosync_core::messages::{OutputRequest, RawInputMap};
use cosync_core::{DataCategory, EntityMapping, MappingEntry, MappingError, Tick};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::deterministic::DeterministicRng;

/// Internal id of the first load.
pub const LOAD_1: Uuid = Uuid::from_u128(0x10);
/// Internal id of the second load.
pub const LOAD_2: Uuid = Uuid::from_u128(0x11);
/// Internal id of the grid node both loads connect to.
pub const NODE_1: Uuid = Uuid::from_u128(0x20);
/// Internal id of the energy manager asking for flexibility.
pub const EM_1: Uuid = Uuid::from_u128(0x30);
/// Internal id of the energy manager offering flexibility.
pub const EM_2: Uuid = Uuid::from_u128(0x31);

/// Host qualifier prepended to sender ids in generated input.
pub const HOST_QUALIFIER: &str = "Host-0";

/// Builds the demo mapping.
///
/// # Errors
///
/// - `MappingError` - Never for the fixed table; kept for callers composing their own
pub fn demo_mapping() -> Result<EntityMapping, MappingError> {
    EntityMapping::from_entries([
        MappingEntry::new("load_1", LOAD_1, DataCategory::PrimaryInput),
        MappingEntry::new("load_1", LOAD_1, DataCategory::ParticipantResult),
        MappingEntry::new("load_2", LOAD_2, DataCategory::PrimaryInput),
        MappingEntry::new("load_2", LOAD_2, DataCategory::ParticipantResult),
        MappingEntry::new("node_1", NODE_1, DataCategory::GridResult),
        MappingEntry::new("em_1", EM_1, DataCategory::FlexInput),
        MappingEntry::new("em_1", EM_1, DataCategory::FlexOptionResult),
        MappingEntry::new("em_2", EM_2, DataCategory::FlexInput),
    ])
}

/// Output labels requested every step.
pub fn demo_request(flexibility: bool) -> OutputRequest {
    let mut request = OutputRequest::from([
        (
            "load_1".to_string(),
            vec!["P[MW]".to_string(), "Q[MVAr]".to_string()],
        ),
        ("load_2".to_string(), vec!["P[kW]".to_string()]),
        (
            "node_1".to_string(),
            vec!["Vm[pu]".to_string(), "Delta_U[pu]".to_string()],
        ),
    ]);
    if flexibility {
        request.insert(
            "em_1".to_string(),
            vec![
                "P_min[MW]".to_string(),
                "P_ref[MW]".to_string(),
                "P_max[MW]".to_string(),
                "FlexOptions".to_string(),
            ],
        );
    }
    request
}

/// Generates the external input for one step.
///
/// Two producers feed `load_1` so their values are summed by the host;
/// `load_2` reports in kW. With flexibility, `em_1` requests options from
/// `em_2`, which answers with a band around its current reference.
pub fn demo_input(rng: &mut DeterministicRng, tick: Tick, flexibility: bool) -> RawInputMap {
    let mut raw = RawInputMap::new();

    insert(
        &mut raw,
        "load_1",
        "P[MW]",
        "pv_1",
        json!(rng.random_power(0.0, 2.0)),
    );
    insert(
        &mut raw,
        "load_1",
        "P[MW]",
        "pv_2",
        json!(rng.random_power(0.0, 2.0)),
    );
    insert(
        &mut raw,
        "load_1",
        "Q[MVAr]",
        "pv_1",
        json!(rng.random_power(-0.5, 0.5)),
    );
    insert(
        &mut raw,
        "load_2",
        "P[kW]",
        "meter_2",
        json!(rng.random_power(100.0, 900.0)),
    );

    if flexibility {
        let qualified = |id: &str| format!("{HOST_QUALIFIER}.{id}");
        insert(
            &mut raw,
            "em_1",
            "FlexRequest",
            &qualified("em_1"),
            json!({ "sender": qualified("em_2") }),
        );

        let p_ref = rng.random_power(-1.0, 1.0);
        insert(
            &mut raw,
            "em_1",
            "FlexOptions",
            &qualified("em_2"),
            json!([{
                "sender": qualified("em_2"),
                "pMin": p_ref - 0.5,
                "pRef": p_ref,
                "pMax": p_ref + 0.5,
            }]),
        );

        // Withdrawn values only show up occasionally, mirroring a sender going quiet.
        if tick > 0 && rng.random_bool(0.2) {
            insert(&mut raw, "em_2", "FlexSetPoint", "controller", Value::Null);
        }
    }

    raw
}

fn insert(raw: &mut RawInputMap, receiver: &str, label: &str, sender: &str, value: Value) {
    raw.entry(receiver.to_string())
        .or_default()
        .entry(label.to_string())
        .or_insert_with(BTreeMap::new)
        .insert(sender.to_string(), value);
}

#[cfg(test)]
mod tests {
    use cosync_core::MessageParser;
    use cosync_core::container::InputContainerBuilder;

    use super::*;

    #[test]
    fn test_demo_mapping_resolves_all_entities() {
        let mapping = demo_mapping().unwrap();

        assert_eq!(mapping.internal_id(DataCategory::PrimaryInput, "load_2"), Some(LOAD_2));
        assert_eq!(
            mapping.find_result_id("node_1"),
            Some((DataCategory::GridResult, NODE_1))
        );
        assert_eq!(mapping.internal_id(DataCategory::FlexInput, "em_2"), Some(EM_2));
    }

    #[test]
    fn test_demo_input_is_fully_classified() {
        let mapping = demo_mapping().unwrap();
        let mut rng = DeterministicRng::from_seed(7);
        let raw = demo_input(&mut rng, 0, true);

        let parsed = MessageParser::default().parse(&raw);
        assert!(parsed.rejected.is_empty());

        let mut builder = InputContainerBuilder::new(&mapping, 0, Some(900));
        builder.extend(&parsed.messages);
        let container = builder.build();

        assert!(container.primary[&LOAD_1].is_complex());
        assert_eq!(container.flex_requests.get(&EM_1), Some(&EM_2));
        assert_eq!(container.flex_options[&EM_1].len(), 1);
    }
}
