//! Per-equipment power and voltage readings from one output message.

use std::collections::BTreeMap;

use thiserror::Error;

use super::message::{MeasurementValue, OutputMessage};
use crate::cim::{DeviceClass, SwitchArea};

/// Phase apparent power (volt-amp) measurement type.
pub const APPARENT_POWER: &str = "VA";
/// Phase-to-neutral voltage measurement type.
pub const PHASE_NEUTRAL_VOLTAGE: &str = "PNV";

#[derive(Debug, Error, PartialEq)]
pub enum MeasurementError {
    #[error("measurement {mrid} of {equipment} is missing from the output message")]
    Missing { mrid: String, equipment: String },

    #[error("measurement {mrid} has no {field}")]
    MissingField { mrid: String, field: &'static str },
}

/// Real and reactive power of one piece of equipment, summed over phases.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerMeasurement {
    pub name: String,
    /// Real power (W).
    pub p: f64,
    /// Reactive power (var).
    pub q: f64,
}

/// Phase-to-neutral voltage magnitudes of one piece of equipment.
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageMeasurement {
    pub name: String,
    /// Phase code -> magnitude (V).
    pub phases: BTreeMap<String, f64>,
}

/// Sums the `VA` measurements of every `class` equipment in `area`.
///
/// Each phase reading of magnitude `s` and angle `θ` (degrees) adds
/// `s·cos θ` to `p` and `s·sin θ` to `q`. Returns an empty map when the
/// area has no equipment of that class.
///
/// # Errors
///
/// Returns `MeasurementError` when a modelled measurement is absent from
/// the message or lacks its magnitude or angle.
pub fn parse_power_measurements(
    message: &OutputMessage,
    area: &SwitchArea,
    class: DeviceClass,
) -> Result<BTreeMap<String, PowerMeasurement>, MeasurementError> {
    let mut power = BTreeMap::new();
    for equipment in area.equipment(class) {
        let mut reading = PowerMeasurement {
            name: equipment.name.clone(),
            p: 0.0,
            q: 0.0,
        };
        for point in equipment
            .measurements
            .iter()
            .filter(|m| m.measurement_type == APPARENT_POWER)
        {
            let value = lookup(message, &point.mrid, &equipment.name)?;
            let s = field(&point.mrid, "magnitude", value.magnitude)?;
            let angle = field(&point.mrid, "angle", value.angle)?.to_radians();
            reading.p += s * angle.cos();
            reading.q += s * angle.sin();
        }
        power.insert(equipment.mrid.clone(), reading);
    }
    Ok(power)
}

/// Collects the `PNV` magnitudes of every `class` equipment in `area`.
///
/// # Errors
///
/// Returns `MeasurementError` when a modelled measurement is absent from
/// the message or lacks its magnitude.
pub fn parse_voltage_measurements(
    message: &OutputMessage,
    area: &SwitchArea,
    class: DeviceClass,
) -> Result<BTreeMap<String, VoltageMeasurement>, MeasurementError> {
    let mut voltages = BTreeMap::new();
    for equipment in area.equipment(class) {
        let mut reading = VoltageMeasurement {
            name: equipment.name.clone(),
            phases: BTreeMap::new(),
        };
        for point in equipment
            .measurements
            .iter()
            .filter(|m| m.measurement_type == PHASE_NEUTRAL_VOLTAGE)
        {
            let value = lookup(message, &point.mrid, &equipment.name)?;
            let magnitude = field(&point.mrid, "magnitude", value.magnitude)?;
            reading.phases.insert(point.phases.clone(), magnitude);
        }
        voltages.insert(equipment.mrid.clone(), reading);
    }
    Ok(voltages)
}

/// Total real power of a parsed reading set.
pub fn total_p(readings: &BTreeMap<String, PowerMeasurement>) -> f64 {
    readings.values().map(|r| r.p).sum()
}

fn lookup<'a>(
    message: &'a OutputMessage,
    mrid: &str,
    equipment: &str,
) -> Result<&'a MeasurementValue, MeasurementError> {
    message
        .measurements
        .get(mrid)
        .ok_or_else(|| MeasurementError::Missing {
            mrid: mrid.to_string(),
            equipment: equipment.to_string(),
        })
}

fn field(mrid: &str, name: &'static str, reading: Option<f64>) -> Result<f64, MeasurementError> {
    reading.ok_or_else(|| MeasurementError::MissingField {
        mrid: mrid.to_string(),
        field: name,
    })
}
