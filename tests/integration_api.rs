//! Integration tests for the REST API feature.

#![cfg(feature = "api")]

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use feeder_efficacy::api::{ApiState, router};
use feeder_efficacy::app::EfficacyApp;
use feeder_efficacy::bus::{Delivery, InMemoryBus};
use feeder_efficacy::bus::topics::simulation_output_topic;

/// Runs a few timesteps through the app and returns the API state over its history.
async fn build_api_state(dir: &std::path::Path) -> Arc<ApiState> {
    let bus = Arc::new(InMemoryBus::new());
    let mut app = EfficacyApp::new(
        bus,
        common::two_area_model(),
        common::SIMULATION_ID,
        common::app_options(dir),
    )
    .expect("app");

    for step in 0..4 {
        let delivery = Delivery {
            destination: simulation_output_topic(common::SIMULATION_ID),
            headers: Vec::new(),
            body: common::output_message(common::START + step * 60, &common::step_readings()),
        };
        app.on_message(&delivery).await.expect("timestep");
    }

    Arc::new(ApiState {
        simulation_id: app.simulation_id().to_string(),
        sections: app.sections().to_vec(),
        history: app.history(),
    })
}

async fn get(state: Arc<ApiState>, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn state_reflects_processed_timesteps() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = get(build_api_state(dir.path()).await, "/state").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["simulation_id"], common::SIMULATION_ID);
    assert_eq!(json["sections"], serde_json::json!(["sw1", "sw2"]));
    assert_eq!(json["report_count"], 4);
    assert_eq!(json["latest"]["date_time"], "03/06/23 14:08");
    assert_eq!(json["latest"]["load"]["sw1"], 4000.0);
    assert!(json["latest"]["load"]["sw2"].is_null());
}

#[tokio::test]
async fn efficacy_range_is_inclusive() {
    let dir = tempfile::tempdir().unwrap();
    let uri = format!(
        "/efficacy?from={}&to={}",
        common::START + 60,
        common::START + 120
    );
    let (status, json) = get(build_api_state(dir.path()).await, &uri).await;

    assert_eq!(status, StatusCode::OK);
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["efficacy"]["sw1"], 1.25);
}

#[tokio::test]
async fn inverted_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = get(build_api_state(dir.path()).await, "/efficacy?from=2&to=1").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}
