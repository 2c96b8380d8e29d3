//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::ApiState;
use super::types::{EfficacyQuery, ErrorResponse, ReportRecord, StateResponse};
use crate::sim::message::Timestamp;

/// Returns the simulation id, section columns, and latest report.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<ApiState>>) -> Json<StateResponse> {
    let latest = state
        .history
        .latest()
        .map(|report| ReportRecord::new(&report, &state.sections));

    Json(StateResponse {
        simulation_id: state.simulation_id.clone(),
        sections: state.sections.clone(),
        report_count: state.history.len(),
        latest,
    })
}

/// Returns processed reports, optionally filtered by timestamp range.
///
/// `GET /efficacy` → 200 + `Vec<ReportRecord>` JSON
/// `GET /efficacy?from=N&to=M` → filtered range (inclusive)
/// `GET /efficacy?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_efficacy(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<EfficacyQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(i64::MIN);
    let to = query.to.unwrap_or(i64::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    let records: Vec<ReportRecord> = state
        .history
        .range(Timestamp(from), Timestamp(to))
        .iter()
        .map(|report| ReportRecord::new(report, &state.sections))
        .collect();

    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::report::{ReportHistory, TimestepReport};

    fn make_test_state(steps: i64) -> Arc<ApiState> {
        let history = ReportHistory::new();
        for t in 0..steps {
            let mut report = TimestepReport::new(Timestamp(t * 60), format!("t{t}"), 2);
            report.efficacy.cells = vec![Some(0.9), None];
            report.load.cells = vec![Some(1000.0), None];
            report.der.cells = vec![Some(-100.0), None];
            history.push(report);
        }
        Arc::new(ApiState {
            simulation_id: "42".to_string(),
            sections: vec!["sw1".to_string(), "sw2".to_string()],
            history,
        })
    }

    async fn get_json(state: Arc<ApiState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn state_returns_200() {
        let (status, json) = get_json(make_test_state(5), "/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["simulation_id"], "42");
        assert_eq!(json["report_count"], 5);
        assert_eq!(json["latest"]["timestamp"], 240);
        assert_eq!(json["latest"]["efficacy"]["sw1"], 0.9);
        assert!(json["latest"]["efficacy"]["sw2"].is_null());
    }

    #[tokio::test]
    async fn state_before_first_report() {
        let (status, json) = get_json(make_test_state(0), "/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["report_count"], 0);
        assert!(json["latest"].is_null());
    }

    #[tokio::test]
    async fn efficacy_returns_all_reports() {
        let (status, json) = get_json(make_test_state(24), "/efficacy").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().map(Vec::len), Some(24));
    }

    #[tokio::test]
    async fn efficacy_range_query() {
        let (status, json) = get_json(make_test_state(24), "/efficacy?from=300&to=600").await;
        assert_eq!(status, StatusCode::OK);
        let records = json.as_array().cloned().unwrap_or_default();
        assert_eq!(records.len(), 6); // 300, 360, ..., 600
        assert_eq!(records[0]["timestamp"], 300);
        assert_eq!(records[5]["timestamp"], 600);
    }

    #[tokio::test]
    async fn efficacy_invalid_range_returns_400() {
        let (status, json) = get_json(make_test_state(3), "/efficacy?from=10&to=5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().is_some_and(|e| e.contains("from")));
    }
}
