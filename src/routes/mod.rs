pub mod backtests;
pub mod devices;
pub mod settings;
pub mod signals;

use crate::error::ApiError;
use crate::server::ServiceState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

/// Assembles the API router.
pub fn api_router() -> Router<Arc<ServiceState>> {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .merge(signals::routes())
        .merge(settings::routes())
        .merge(devices::routes())
        .merge(backtests::routes())
}

/// GET /: service banner with the current settings.
async fn home(State(state): State<Arc<ServiceState>>) -> Result<Json<Value>, ApiError> {
    let settings = state.db.load_settings().await?;
    Ok(Json(json!({
        "service": "pulse",
        "status": "ok",
        "settings": settings,
    })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
