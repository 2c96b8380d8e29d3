//! End-to-end efficacy runs over the in-memory bus.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use feeder_efficacy::app::EfficacyApp;
use feeder_efficacy::bus::topics::{
    REQUEST_TOPOLOGY, application_output_topic, simulation_log_topic, simulation_output_topic,
};
use feeder_efficacy::bus::{InMemoryBus, MessageBus};
use feeder_efficacy::cim::topology::request_switch_areas;
use feeder_efficacy::cim::{BlazegraphClient, DistributedModel, load_distributed_model};
use feeder_efficacy::config::ModelConfig;
use feeder_efficacy::runner::{self, StopReason};
use feeder_efficacy::sim::message::SimulationStatus;

#[tokio::test]
async fn topology_reply_builds_two_sections() {
    let bus = InMemoryBus::new();
    bus.respond_with(REQUEST_TOPOLOGY, common::switch_areas_reply());

    let topology = request_switch_areas(&bus, common::FEEDER_MRID, Duration::from_secs(1))
        .await
        .expect("topology");
    let model = DistributedModel::assemble(
        common::FEEDER_MRID,
        "fixture",
        &topology,
        common::feeder_equipment(),
        false,
    )
    .expect("model");

    assert_eq!(model.section_names().expect("names"), vec!["sw1", "sw2"]);
    assert_eq!(model.switch_areas[0].equipment_count(), 3);
    assert_eq!(model.switch_areas[1].equipment_count(), 1);
}

#[tokio::test]
async fn run_writes_logs_and_publishes_each_timestep() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = Arc::new(InMemoryBus::new());
    let mut app = EfficacyApp::new(
        bus.clone(),
        common::two_area_model(),
        common::SIMULATION_ID,
        common::app_options(dir.path()),
    )
    .expect("app");

    let mut output = bus
        .subscribe(&simulation_output_topic(common::SIMULATION_ID))
        .await
        .expect("output");
    let mut log = bus
        .subscribe(&simulation_log_topic(common::SIMULATION_ID))
        .await
        .expect("log");

    for step in 0..3 {
        let reached = bus.deliver(
            &simulation_output_topic(common::SIMULATION_ID),
            common::output_message(common::START + step * 60, &common::step_readings()),
        );
        assert_eq!(reached, 1);
    }
    bus.deliver(
        &simulation_log_topic(common::SIMULATION_ID),
        json!({"processStatus": "COMPLETE", "logMessage": "Simulation complete"}),
    );

    let reason = tokio::time::timeout(
        Duration::from_secs(5),
        runner::run(&mut app, &mut output, Some(&mut log), std::future::pending()),
    )
    .await
    .expect("run finishes");
    assert_eq!(reason, StopReason::Completed(SimulationStatus::Complete));
    assert_eq!(app.history().len(), 3);

    let read = |name: &str| fs::read_to_string(dir.path().join(name)).expect("log file");
    assert_eq!(
        read("efficacy1234.csv"),
        "timestamp,sw1,sw2\n\
         03/06/23 14:05,1.25,\n\
         03/06/23 14:06,1.25,\n\
         03/06/23 14:07,1.25,\n"
    );
    assert!(read("load1234.csv").lines().skip(1).all(|l| l.ends_with(",4000.0,")));
    assert!(read("der1234.csv").lines().skip(1).all(|l| l.ends_with(",1000.0,")));

    let published = bus.sent_to(&application_output_topic("demo-efficacy-app", common::SIMULATION_ID));
    assert_eq!(published.len(), 3);
    assert_eq!(published[2]["timestamp"], common::START + 120);
    assert_eq!(published[2]["efficacy"]["timestamp"], "03/06/23 14:07");
    assert_eq!(published[2]["efficacy"]["sw1"], 1.25);
    assert!(published[2]["efficacy"].get("sw2").is_none());
    assert_eq!(published[0]["der"]["sw1"], 1000.0);
}

#[tokio::test]
async fn incomplete_timestep_is_dropped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = Arc::new(InMemoryBus::new());
    let mut app = EfficacyApp::new(
        bus.clone(),
        common::two_area_model(),
        common::SIMULATION_ID,
        common::app_options(dir.path()),
    )
    .expect("app");
    let mut output = bus
        .subscribe(&simulation_output_topic(common::SIMULATION_ID))
        .await
        .expect("output");

    let mut partial = common::step_readings();
    partial.retain(|(mrid, _)| *mrid != "_M_PV2");
    bus.deliver(
        &simulation_output_topic(common::SIMULATION_ID),
        common::output_message(common::START, &partial),
    );
    bus.deliver(
        &simulation_output_topic(common::SIMULATION_ID),
        common::output_message(common::START + 60, &common::step_readings()),
    );
    bus.close();

    let reason = runner::run(&mut app, &mut output, None, std::future::pending()).await;
    assert_eq!(reason, StopReason::OutputClosed);

    let efficacy = fs::read_to_string(dir.path().join("efficacy1234.csv")).expect("log file");
    assert_eq!(efficacy, "timestamp,sw1,sw2\n03/06/23 14:06,1.25,\n");
    assert_eq!(bus.sent().len(), 1);
}

#[tokio::test]
async fn model_snapshot_skips_the_model_services() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("model.json");
    common::two_area_model().save_snapshot(&path).expect("save");

    let config = ModelConfig {
        snapshot: Some(path),
        ..ModelConfig::default()
    };
    let bus = InMemoryBus::new();
    let blazegraph = BlazegraphClient::new("http://127.0.0.1:9/unused");
    let model = load_distributed_model(&bus, &blazegraph, &config, Duration::from_secs(1))
        .await
        .expect("snapshot loads");

    assert_eq!(model, common::two_area_model());
    assert!(bus.sent().is_empty());
}
