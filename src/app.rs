//! Per-section DER efficacy application.
//!
//! For every simulation timestep the app sums load and DER real power in
//! each switch area, appends one row to each of the efficacy, load, and
//! DER logs, and publishes the efficacy and DER maps on its output topic.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bus::topics::application_output_topic;
use crate::bus::{BusError, Delivery, MessageBus, unwrap_json_string};
use crate::cim::{DeviceClass, DistributedModel, ModelError};
use crate::config::AppConfig;
use crate::io::export::{CsvLogs, ExportError};
use crate::report::{Clock, ReportHistory, TimestepReport, format_timestamp};
use crate::sim::measurement::{MeasurementError, parse_power_measurements, total_p};
use crate::sim::message::{OutputMessage, SimulationOutput};
use crate::sim::section::SectionBalance;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("invalid simulation output message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Runtime options of the efficacy app.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub application_id: String,
    pub output_dir: PathBuf,
    pub clock: Clock,
    /// Publish each report on the application output topic.
    pub publish: bool,
}

impl From<&AppConfig> for AppOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            application_id: config.gridappsd.application_id.clone(),
            output_dir: config.output.directory.clone(),
            clock: Clock::from_local_time(config.output.local_time),
            publish: config.output.publish,
        }
    }
}

pub struct EfficacyApp {
    bus: Arc<dyn MessageBus>,
    model: DistributedModel,
    simulation_id: String,
    sections: Vec<String>,
    output_topic: String,
    logs: CsvLogs,
    history: ReportHistory,
    options: AppOptions,
}

impl EfficacyApp {
    /// Builds the section columns and creates the CSV logs.
    ///
    /// # Arguments
    ///
    /// * `bus` - Bus the reports are published on
    /// * `model` - Switch-area model of the feeder
    /// * `simulation_id` - Simulation whose output is consumed; also names the logs
    /// * `options` - Output directory, clock, and publishing options
    ///
    /// # Returns
    ///
    /// An app with empty history and freshly truncated logs.
    ///
    /// # Errors
    ///
    /// Fails if an area has no boundary switch or the logs cannot be created.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        model: DistributedModel,
        simulation_id: impl Into<String>,
        options: AppOptions,
    ) -> Result<Self, AppError> {
        let simulation_id = simulation_id.into();
        let sections = model.section_names()?;
        let logs = CsvLogs::create(&options.output_dir, &simulation_id, &sections)?;
        let output_topic = application_output_topic(&options.application_id, &simulation_id);
        info!(
            %simulation_id,
            feeder = %model.feeder_name,
            sections = ?sections,
            topic = %output_topic,
            "efficacy app ready"
        );
        Ok(Self {
            bus,
            model,
            simulation_id,
            sections,
            output_topic,
            logs,
            history: ReportHistory::new(),
            options,
        })
    }

    /// Handles one delivery from the simulation output topic.
    ///
    /// Returns `Ok(None)` for deliveries that are not simulation output.
    /// A timestep that fails to compute writes nothing. Once its rows are
    /// written a timestep is recorded; a failed publish is only logged.
    pub async fn on_message(&mut self, delivery: &Delivery) -> Result<Option<TimestepReport>, AppError> {
        if !delivery.destination.contains("output") {
            debug!(destination = %delivery.destination, "ignoring non-output delivery");
            return Ok(None);
        }

        let output: SimulationOutput = serde_json::from_value(unwrap_json_string(delivery.body.clone()))?;
        let report = compute_report(
            &self.model,
            &output.message,
            self.options.clock,
            self.sections.len(),
        )?;

        self.logs.append(&report)?;
        self.history.push(report.clone());
        let published = if self.options.publish {
            self.publish_efficacy(&report).await
        } else {
            Ok(())
        };
        if let Err(e) = published {
            warn!(
                simulation_id = %self.simulation_id,
                timestamp = %report.timestamp,
                error = %e,
                "failed to publish efficacy"
            );
        }
        debug!(
            simulation_id = %self.simulation_id,
            timestamp = %report.timestamp,
            "timestep processed"
        );
        Ok(Some(report))
    }

    /// Publishes the efficacy and DER maps of one report.
    pub async fn publish_efficacy(&self, report: &TimestepReport) -> Result<(), BusError> {
        let message = json!({
            "timestamp": report.timestamp,
            "efficacy": Value::Object(report.efficacy.to_json_map(&self.sections, &report.date_time)),
            "der": Value::Object(report.der.to_json_map(&self.sections, &report.date_time)),
        });
        self.bus.send(&self.output_topic, &message).await
    }

    /// Shared view of processed reports.
    pub fn history(&self) -> ReportHistory {
        self.history.clone()
    }

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    pub fn simulation_id(&self) -> &str {
        &self.simulation_id
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    /// Bus the app publishes on.
    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }
}

/// Computes the efficacy, load, and DER rows of one timestep.
///
/// Columns of areas without loads stay empty.
///
/// A zero load total does not fail the timestep. The area keeps its load
/// and DER cells and only its efficacy cell is left empty, so the other
/// areas of that timestep are still logged.
///
/// # Arguments
///
/// * `model` - Switch-area model naming the measured equipment
/// * `message` - One simulation output message
/// * `clock` - Time zone used to format the row timestamp
/// * `width` - Number of section columns
///
/// # Returns
///
/// A report with `width` cells in each row.
///
/// # Errors
///
/// Returns the first `MeasurementError` of any area.
pub fn compute_report(
    model: &DistributedModel,
    message: &OutputMessage,
    clock: Clock,
    width: usize,
) -> Result<TimestepReport, MeasurementError> {
    let date_time = format_timestamp(message.timestamp, clock);
    let mut report = TimestepReport::new(message.timestamp, date_time, width);

    for (column, area) in model.switch_areas.iter().enumerate().take(width) {
        let name = area.parent_switch().map_or("", |s| s.name.as_str());
        let mut balance = SectionBalance::new(name);

        let der = parse_power_measurements(message, area, DeviceClass::PowerElectronicsConnection)?;
        for reading in der.values() {
            balance.add_der_w(reading.p);
        }
        let loads = parse_power_measurements(message, area, DeviceClass::EnergyConsumer)?;
        for reading in loads.values() {
            balance.add_load_w(reading.p);
        }

        if !balance.has_load() {
            debug!(area = column, section = name, "no loads in area");
            continue;
        }
        if balance.efficacy().is_none() {
            warn!(area = column, section = name, "loads sum to zero, efficacy undefined");
        }
        debug!(
            area = column,
            section = name,
            load_w = total_p(&loads),
            der_w = balance.der_w(),
            ders = balance.der_count(),
            "section balance"
        );

        report.efficacy.cells[column] = balance.efficacy();
        report.load.cells[column] = Some(balance.load_w());
        report.der.cells[column] = Some(balance.der_w());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::fs;

    use super::*;
    use crate::bus::{InMemoryBus, Subscription};
    use crate::cim::{BoundarySwitch, Equipment, MeasurementPoint, SwitchArea};
    use crate::sim::message::{MeasurementValue, Timestamp};

    fn equipment(mrid: &str, class: DeviceClass, meas: &str) -> Equipment {
        Equipment {
            mrid: mrid.to_string(),
            name: mrid.to_lowercase(),
            class,
            measurements: vec![MeasurementPoint {
                mrid: meas.to_string(),
                name: format!("{meas}_va"),
                measurement_type: "VA".to_string(),
                phases: "A".to_string(),
            }],
        }
    }

    fn area(switch: &str, items: Vec<Equipment>) -> SwitchArea {
        let mut area = SwitchArea {
            boundary_switches: vec![BoundarySwitch {
                mrid: format!("_{switch}"),
                name: switch.to_string(),
            }],
            typed_catalog: BTreeMap::new(),
            secondary_areas: Vec::new(),
        };
        for item in items {
            area.insert(item);
        }
        area
    }

    fn model() -> DistributedModel {
        DistributedModel {
            feeder_mrid: "_FEEDER".to_string(),
            feeder_name: "test".to_string(),
            switch_areas: vec![
                area(
                    "sw1",
                    vec![
                        equipment("LD1", DeviceClass::EnergyConsumer, "m1"),
                        equipment("PV1", DeviceClass::PowerElectronicsConnection, "m2"),
                    ],
                ),
                area("sw2", vec![equipment("PV2", DeviceClass::PowerElectronicsConnection, "m3")]),
            ],
        }
    }

    fn message(readings: &[(&str, f64)]) -> OutputMessage {
        let measurements: HashMap<String, MeasurementValue> = readings
            .iter()
            .map(|(mrid, magnitude)| {
                (
                    mrid.to_string(),
                    MeasurementValue {
                        measurement_mrid: Some(mrid.to_string()),
                        magnitude: Some(*magnitude),
                        angle: Some(0.0),
                        value: None,
                    },
                )
            })
            .collect();
        OutputMessage {
            timestamp: Timestamp(1_678_111_500),
            measurements,
        }
    }

    fn options(dir: &std::path::Path) -> AppOptions {
        AppOptions {
            application_id: "demo-efficacy-app".to_string(),
            output_dir: dir.to_path_buf(),
            clock: Clock::Utc,
            publish: true,
        }
    }

    #[test]
    fn report_fills_only_areas_with_loads() {
        let msg = message(&[("m1", 4000.0), ("m2", 1000.0), ("m3", 500.0)]);
        let report = compute_report(&model(), &msg, Clock::Utc, 2).expect("report");
        assert_eq!(report.date_time, "03/06/23 14:05");
        assert_eq!(report.load.cells, vec![Some(4000.0), None]);
        assert_eq!(report.der.cells, vec![Some(1000.0), None]);
        assert_eq!(report.efficacy.cells, vec![Some(1.25), None]);
    }

    #[test]
    fn missing_measurement_fails_the_timestep() {
        let msg = message(&[("m1", 4000.0)]);
        let err = compute_report(&model(), &msg, Clock::Utc, 2).expect_err("missing m2");
        assert!(matches!(err, MeasurementError::Missing { .. }));
    }

    #[test]
    fn zero_load_leaves_efficacy_empty() {
        let msg = message(&[("m1", 0.0), ("m2", 100.0), ("m3", 0.0)]);
        let report = compute_report(&model(), &msg, Clock::Utc, 2).expect("report");
        assert_eq!(report.efficacy.cells[0], None);
        assert_eq!(report.load.cells[0], Some(0.0));
        assert_eq!(report.der.cells[0], Some(100.0));
    }

    #[tokio::test]
    async fn on_message_writes_publishes_and_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = Arc::new(InMemoryBus::new());
        let mut app = EfficacyApp::new(bus.clone(), model(), "42", options(dir.path())).expect("app");
        assert_eq!(app.sections(), ["sw1".to_string(), "sw2".to_string()]);

        let body = json!({
            "simulation_id": "42",
            "message": {
                "timestamp": 1_678_111_500,
                "measurements": {
                    "m1": {"measurement_mrid": "m1", "magnitude": 2000.0, "angle": 0.0},
                    "m2": {"measurement_mrid": "m2", "magnitude": 500.0, "angle": 0.0},
                    "m3": {"measurement_mrid": "m3", "magnitude": 10.0, "angle": 0.0}
                }
            }
        });
        let delivery = Delivery {
            destination: "/topic/goss.gridappsd.simulation.output.42".to_string(),
            headers: Vec::new(),
            body: Value::String(body.to_string()),
        };

        let report = app.on_message(&delivery).await.expect("handled").expect("report");
        assert_eq!(report.efficacy.cells[0], Some(1.25));
        assert_eq!(app.history().len(), 1);

        let efficacy = fs::read_to_string(dir.path().join("efficacy42.csv")).expect("csv");
        assert_eq!(efficacy, "timestamp,sw1,sw2\n03/06/23 14:05,1.25,\n");

        let published = bus.sent_to(app.output_topic());
        assert_eq!(published.len(), 1);
        assert_eq!(published[0]["timestamp"], 1_678_111_500);
        assert_eq!(published[0]["efficacy"]["sw1"], 1.25);
        assert_eq!(published[0]["efficacy"]["timestamp"], "03/06/23 14:05");
        assert_eq!(published[0]["der"]["sw1"], 500.0);
        assert!(published[0]["der"].get("sw2").is_none());
    }

    #[tokio::test]
    async fn non_output_destination_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = Arc::new(InMemoryBus::new());
        let mut app = EfficacyApp::new(bus.clone(), model(), "42", options(dir.path())).expect("app");
        let delivery = Delivery {
            destination: "/topic/goss.gridappsd.simulation.log.42".to_string(),
            headers: Vec::new(),
            body: json!({"processStatus": "RUNNING"}),
        };
        assert!(app.on_message(&delivery).await.expect("ignored").is_none());
        assert!(app.history().is_empty());
        assert!(bus.sent().is_empty());
    }

    #[tokio::test]
    async fn publish_can_be_disabled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = Arc::new(InMemoryBus::new());
        let mut opts = options(dir.path());
        opts.publish = false;
        let mut app = EfficacyApp::new(bus.clone(), model(), "9", opts).expect("app");
        let delivery = Delivery {
            destination: "/topic/goss.gridappsd.simulation.output.9".to_string(),
            headers: Vec::new(),
            body: json!({"message": {"timestamp": 0, "measurements": {
                "m1": {"magnitude": 1.0, "angle": 0.0},
                "m2": {"magnitude": 0.0, "angle": 0.0},
                "m3": {"magnitude": 0.0, "angle": 0.0}
            }}}),
        };
        assert!(app.on_message(&delivery).await.expect("handled").is_some());
        assert!(bus.sent().is_empty());
    }

    struct ClosedBus;

    #[async_trait::async_trait]
    impl MessageBus for ClosedBus {
        async fn subscribe(&self, _destination: &str) -> Result<Subscription, BusError> {
            Err(BusError::Closed)
        }

        async fn unsubscribe(&self, _subscription: &Subscription) -> Result<(), BusError> {
            Err(BusError::Closed)
        }

        async fn send(&self, _destination: &str, _body: &Value) -> Result<(), BusError> {
            Err(BusError::Closed)
        }

        async fn request(
            &self,
            _destination: &str,
            _body: &Value,
            _timeout: std::time::Duration,
        ) -> Result<Value, BusError> {
            Err(BusError::Closed)
        }
    }

    #[tokio::test]
    async fn failed_publish_keeps_the_timestep() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = EfficacyApp::new(Arc::new(ClosedBus), model(), "8", options(dir.path())).expect("app");
        let delivery = Delivery {
            destination: "/topic/goss.gridappsd.simulation.output.8".to_string(),
            headers: Vec::new(),
            body: json!({"message": {"timestamp": 1_678_111_500, "measurements": {
                "m1": {"magnitude": 2000.0, "angle": 0.0},
                "m2": {"magnitude": 500.0, "angle": 0.0},
                "m3": {"magnitude": 0.0, "angle": 0.0}
            }}}),
        };

        let report = app.on_message(&delivery).await.expect("handled").expect("report");
        assert_eq!(report.efficacy.cells[0], Some(1.25));
        assert_eq!(app.history().len(), 1);

        let efficacy = fs::read_to_string(dir.path().join("efficacy8.csv")).expect("csv");
        assert_eq!(efficacy, "timestamp,sw1,sw2\n03/06/23 14:05,1.25,\n");
        let load = fs::read_to_string(dir.path().join("load8.csv")).expect("csv");
        assert_eq!(load, "timestamp,sw1,sw2\n03/06/23 14:05,2000.0,\n");
    }
}
