//! Starting and stopping simulation runs through the platform.

use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::bus::topics::{REQUEST_SIMULATION, simulation_input_topic};
use crate::bus::{BusError, MessageBus, unwrap_json_string};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("simulation request failed: {0}")]
    Bus(#[from] BusError),

    #[error("simulation reply carries no simulation id: {0}")]
    NoSimulationId(Value),
}

/// Requests a new simulation run and returns its id.
///
/// The platform replies either with `{"simulationId": ...}` or with the
/// bare id.
pub async fn start_simulation(
    bus: &dyn MessageBus,
    run_config: &Value,
    timeout: Duration,
) -> Result<String, LifecycleError> {
    let reply = bus.request(REQUEST_SIMULATION, run_config, timeout).await?;
    let simulation_id = simulation_id_from_reply(&unwrap_json_string(reply.clone()))
        .ok_or(LifecycleError::NoSimulationId(reply))?;
    info!(%simulation_id, "simulation started");
    Ok(simulation_id)
}

/// Asks a running simulation to stop.
pub async fn stop_simulation(bus: &dyn MessageBus, simulation_id: &str) -> Result<(), BusError> {
    bus.send(
        &simulation_input_topic(simulation_id),
        &json!({ "command": "stop" }),
    )
    .await?;
    info!(%simulation_id, "simulation stop requested");
    Ok(())
}

fn simulation_id_from_reply(reply: &Value) -> Option<String> {
    let id = match reply {
        Value::Object(map) => map.get("simulationId")?,
        other => other,
    };
    match id {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
