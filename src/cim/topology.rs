//! Switch-area topology requested from the platform topology service.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::ModelError;
use crate::bus::topics::REQUEST_TOPOLOGY;
use crate::bus::{MessageBus, unwrap_json_string};

/// Request type that partitions a feeder into switch areas.
pub const GET_SWITCH_AREAS: &str = "GET_SWITCH_AREAS";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeederTopology {
    pub feeder_id: String,
    pub addressable_equipment: Vec<String>,
    pub unaddressable_equipment: Vec<String>,
    pub connectivity_node: Vec<String>,
    pub switch_areas: Vec<SwitchAreaTopology>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SwitchAreaTopology {
    pub boundary_switches: Vec<String>,
    pub addressable_equipment: Vec<String>,
    pub unaddressable_equipment: Vec<String>,
    pub connectivity_node: Vec<String>,
    pub secondary_areas: Vec<SecondaryAreaTopology>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SecondaryAreaTopology {
    pub distribution_transformer: Vec<String>,
    pub addressable_equipment: Vec<String>,
    pub unaddressable_equipment: Vec<String>,
    pub connectivity_node: Vec<String>,
}

/// Body of a `GET_SWITCH_AREAS` request for one feeder model.
pub fn switch_areas_request(model_mrid: &str) -> Value {
    json!({
        "requestType": GET_SWITCH_AREAS,
        "modelID": model_mrid,
        "resultFormat": "JSON",
    })
}

/// Extracts the feeder topology from a topology service reply.
///
/// The `feeders` object is accepted at the top level or nested under
/// `data`; a reply encoded as a JSON string is decoded first.
pub fn parse_switch_areas(reply: Value) -> Result<FeederTopology, ModelError> {
    let reply = unwrap_json_string(reply);
    let feeders = reply
        .get("feeders")
        .or_else(|| reply.get("data").and_then(|d| d.get("feeders")))
        .ok_or_else(|| ModelError::Topology("reply has no \"feeders\" object".to_string()))?;
    Ok(FeederTopology::deserialize(feeders)?)
}

/// Requests the switch-area partition of a feeder over the bus.
pub async fn request_switch_areas(
    bus: &dyn MessageBus,
    model_mrid: &str,
    timeout: Duration,
) -> Result<FeederTopology, ModelError> {
    let reply = bus
        .request(REQUEST_TOPOLOGY, &switch_areas_request(model_mrid), timeout)
        .await?;
    let topology = parse_switch_areas(reply)?;
    debug!(
        feeder = %topology.feeder_id,
        areas = topology.switch_areas.len(),
        "received switch areas"
    );
    Ok(topology)
}
