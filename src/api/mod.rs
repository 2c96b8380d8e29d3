//! REST API over the report history of a running app.
//!
//! Provides two GET endpoints:
//! - `/state` for the simulation id, section columns, report count, and latest report
//! - `/efficacy` for processed reports with optional timestamp range filtering

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::report::ReportHistory;

pub use types::{EfficacyQuery, ErrorResponse, ReportRecord, StateResponse};

/// State shared across all request handlers.
///
/// The history is appended by the consumer loop while the server reads it.
pub struct ApiState {
    /// Simulation the reports belong to.
    pub simulation_id: String,
    /// Section columns in CSV order.
    pub sections: Vec<String>,
    /// Shared report history.
    pub history: ReportHistory,
}

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `state` - Shared state read by every handler
///
/// # Returns
///
/// A `Router` serving `/state` and `/efficacy`.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/efficacy", get(handlers::get_efficacy))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server fails.
///
/// # Arguments
///
/// * `state` - Shared state passed to [`router`]
/// * `addr` - Socket address to listen on
///
/// # Errors
///
/// Returns the I/O error if binding or serving fails.
pub async fn serve(state: Arc<ApiState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "api server listening");
    axum::serve(listener, app).await
}
