//! Feeder model loading: switch-area topology, equipment, and measurements.

pub mod model;
pub mod sparql;
pub mod topology;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

pub use model::{
    BoundarySwitch, DeviceClass, DistributedModel, Equipment, MeasurementPoint, SwitchArea,
};
pub use sparql::BlazegraphClient;

use crate::bus::{BusError, MessageBus};
use crate::config::ModelConfig;

/// Errors raised while loading or assembling the feeder model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("switch area {area} has no boundary switch")]
    NoBoundarySwitch { area: usize },

    #[error("invalid topology reply: {0}")]
    Topology(String),

    #[error("topology request failed: {0}")]
    Bus(#[from] BusError),

    #[error("SPARQL request failed: {0}")]
    Sparql(#[from] reqwest::Error),

    #[error("SPARQL endpoint returned HTTP {status}: {body}")]
    SparqlStatus { status: u16, body: String },

    #[error("cannot access model snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Loads the feeder model described by `config`.
///
/// A configured snapshot is read from disk; otherwise the switch areas
/// come from the platform topology service and the equipment from the
/// model database.
pub async fn load_distributed_model(
    bus: &dyn MessageBus,
    blazegraph: &BlazegraphClient,
    config: &ModelConfig,
    timeout: Duration,
) -> Result<DistributedModel, ModelError> {
    if let Some(path) = &config.snapshot {
        let model = DistributedModel::load_snapshot(path)?;
        info!(
            path = %path.display(),
            areas = model.switch_areas.len(),
            "loaded model snapshot"
        );
        return Ok(model);
    }

    let topology = topology::request_switch_areas(bus, &config.mrid, timeout).await?;
    let equipment = blazegraph.feeder_equipment(&config.mrid).await?;
    DistributedModel::assemble(
        &config.mrid,
        &config.name,
        &topology,
        equipment,
        config.include_secondary_areas,
    )
}
