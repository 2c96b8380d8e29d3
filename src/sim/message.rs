//! Simulation output and log message formats.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Simulation time in seconds since the Unix epoch.
///
/// Accepts a JSON integer, float, or numeric string on input and always
/// serializes as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn seconds(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Int(secs) => Ok(Timestamp(secs)),
            RawTimestamp::Float(secs) => Ok(Timestamp(secs.trunc() as i64)),
            RawTimestamp::Text(text) => {
                let text = text.trim();
                text.parse::<i64>()
                    .or_else(|_| text.parse::<f64>().map(|f| f.trunc() as i64))
                    .map(Timestamp)
                    .map_err(|_| serde::de::Error::custom(format!("invalid timestamp {text:?}")))
            }
        }
    }
}

/// Envelope published on the simulation output topic.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationOutput {
    #[serde(default)]
    pub simulation_id: Option<Value>,
    pub message: OutputMessage,
}

/// One timestep of measurements keyed by measurement mRID.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputMessage {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub measurements: HashMap<String, MeasurementValue>,
}

/// Value of one measurement; analogs carry magnitude and angle, discretes a value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MeasurementValue {
    #[serde(default)]
    pub measurement_mrid: Option<String>,
    #[serde(default)]
    pub magnitude: Option<f64>,
    /// Degrees.
    #[serde(default)]
    pub angle: Option<f64>,
    #[serde(default)]
    pub value: Option<i64>,
}

/// Process status reported on the simulation log topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationStatus {
    Starting,
    Started,
    Running,
    Paused,
    Resumed,
    Stopped,
    Complete,
    Closed,
    Error,
    #[serde(other)]
    Unknown,
}

impl SimulationStatus {
    /// No further output follows a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SimulationStatus::Complete
                | SimulationStatus::Closed
                | SimulationStatus::Stopped
                | SimulationStatus::Error
        )
    }
}

/// Entry published on the simulation log topic.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationLog {
    pub process_status: SimulationStatus,
    #[serde(default)]
    pub log_message: Option<String>,
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Parses a log entry, returning `None` for bodies without a process status.
pub fn parse_log(body: &Value) -> Option<SimulationLog> {
    SimulationLog::deserialize(body).ok()
}
