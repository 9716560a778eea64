use crate::error::ApiError;
use crate::models::SignalReport;
use crate::server::ServiceState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

pub fn routes() -> Router<Arc<ServiceState>> {
    Router::new().route("/get_signals", get(get_signals))
}

/// GET /get_signals: live signals for both assets. Per-asset failures
/// degrade the affected block instead of failing the request.
async fn get_signals(
    State(state): State<Arc<ServiceState>>,
) -> Result<Json<SignalReport>, ApiError> {
    let report = state.compute_signal_report().await?;
    Ok(Json(report))
}
