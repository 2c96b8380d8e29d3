//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;

use serde_json::{Value, json};

use feeder_efficacy::app::AppOptions;
use feeder_efficacy::cim::topology::{FeederTopology, parse_switch_areas};
use feeder_efficacy::cim::{DeviceClass, DistributedModel, Equipment, MeasurementPoint};
use feeder_efficacy::report::Clock;

pub const FEEDER_MRID: &str = "_FEEDER";
pub const SIMULATION_ID: &str = "1234";

/// First timestep of the fixture run: 2023-03-06 14:05:00 UTC.
pub const START: i64 = 1_678_111_500;

/// Equipment with a single phase-A `VA` measurement.
pub fn equipment(mrid: &str, name: &str, class: DeviceClass, measurement: &str) -> Equipment {
    let measurements = if class.is_switch() {
        Vec::new()
    } else {
        vec![MeasurementPoint {
            mrid: measurement.to_string(),
            name: format!("{name}_VA"),
            measurement_type: "VA".to_string(),
            phases: "A".to_string(),
        }]
    };
    Equipment {
        mrid: mrid.to_string(),
        name: name.to_string(),
        class,
        measurements,
    }
}

/// Feeder equipment of the two-area fixture.
///
/// Area 1 (`sw1`) holds two loads and one inverter; area 2 (`sw2`) holds
/// one inverter and no loads.
pub fn feeder_equipment() -> Vec<Equipment> {
    vec![
        equipment("_SW1", "sw1", DeviceClass::LoadBreakSwitch, ""),
        equipment("_SW2", "sw2", DeviceClass::Recloser, ""),
        equipment("_LD1", "ld1", DeviceClass::EnergyConsumer, "_M_LD1"),
        equipment("_LD2", "ld2", DeviceClass::EnergyConsumer, "_M_LD2"),
        equipment("_PV1", "pv1", DeviceClass::PowerElectronicsConnection, "_M_PV1"),
        equipment("_PV2", "pv2", DeviceClass::PowerElectronicsConnection, "_M_PV2"),
    ]
}

/// Topology service reply for the two-area fixture, string-encoded as the
/// platform sends it.
pub fn switch_areas_reply() -> Value {
    let reply = json!({
        "feeders": {
            "feeder_id": FEEDER_MRID,
            "addressable_equipment": [],
            "unaddressable_equipment": [],
            "connectivity_node": [],
            "switch_areas": [
                {
                    "boundary_switches": ["_SW1"],
                    "addressable_equipment": ["_PV1"],
                    "unaddressable_equipment": ["_LD1", "_LD2"],
                    "connectivity_node": [],
                    "secondary_areas": []
                },
                {
                    "boundary_switches": ["_SW2", "_SW1"],
                    "addressable_equipment": ["_PV2"],
                    "unaddressable_equipment": [],
                    "connectivity_node": [],
                    "secondary_areas": []
                }
            ]
        }
    });
    Value::String(reply.to_string())
}

pub fn topology() -> FeederTopology {
    parse_switch_areas(switch_areas_reply()).expect("fixture topology parses")
}

pub fn two_area_model() -> DistributedModel {
    DistributedModel::assemble(FEEDER_MRID, "fixture", &topology(), feeder_equipment(), false)
        .expect("fixture model assembles")
}

/// Simulation output envelope with zero-angle readings.
pub fn output_message(timestamp: i64, readings: &[(&str, f64)]) -> Value {
    let measurements: serde_json::Map<String, Value> = readings
        .iter()
        .map(|(mrid, magnitude)| {
            (
                mrid.to_string(),
                json!({"measurement_mrid": mrid, "magnitude": magnitude, "angle": 0.0}),
            )
        })
        .collect();
    json!({
        "simulation_id": SIMULATION_ID,
        "message": {
            "timestamp": timestamp,
            "measurements": measurements
        }
    })
}

/// Readings for one timestep: loads of 3000 W and 1000 W, 1000 W and 50 W of DER.
pub fn step_readings() -> Vec<(&'static str, f64)> {
    vec![
        ("_M_LD1", 3000.0),
        ("_M_LD2", 1000.0),
        ("_M_PV1", 1000.0),
        ("_M_PV2", 50.0),
    ]
}

pub fn app_options(dir: &Path) -> AppOptions {
    AppOptions {
        application_id: "demo-efficacy-app".to_string(),
        output_dir: dir.to_path_buf(),
        clock: Clock::Utc,
        publish: true,
    }
}
