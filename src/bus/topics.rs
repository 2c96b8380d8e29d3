//! Platform topic names.

const BASE_SIMULATION_TOPIC: &str = "/topic/goss.gridappsd.simulation";
const BASE_APPLICATION_TOPIC: &str = "/topic/goss.gridappsd.application";

/// Request queue that starts a simulation run.
pub const REQUEST_SIMULATION: &str = "goss.gridappsd.process.request.simulation";

/// Request queue for topology queries (switch areas, feeder trees).
pub const REQUEST_TOPOLOGY: &str = "goss.gridappsd.request.data.topology";

/// Measurement stream published once per simulation timestep.
pub fn simulation_output_topic(simulation_id: &str) -> String {
    format!("{BASE_SIMULATION_TOPIC}.output.{simulation_id}")
}

/// Command topic consumed by the running simulation.
pub fn simulation_input_topic(simulation_id: &str) -> String {
    format!("{BASE_SIMULATION_TOPIC}.input.{simulation_id}")
}

/// Process log and status stream of a simulation.
pub fn simulation_log_topic(simulation_id: &str) -> String {
    format!("{BASE_SIMULATION_TOPIC}.log.{simulation_id}")
}

/// Output topic of one application within one simulation.
pub fn application_output_topic(application_id: &str, simulation_id: &str) -> String {
    format!("{BASE_APPLICATION_TOPIC}.{application_id}.{simulation_id}.output")
}
