use crate::error::ApiError;
use crate::models::{RiskSettings, SettingsPatch};
use crate::server::ServiceState;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn routes() -> Router<Arc<ServiceState>> {
    Router::new()
        .route("/settings", get(get_settings))
        .route("/save_settings", post(save_settings))
}

async fn get_settings(
    State(state): State<Arc<ServiceState>>,
) -> Result<Json<RiskSettings>, ApiError> {
    let settings = state.db.load_settings().await?;
    Ok(Json(settings))
}

/// POST /save_settings: merge the provided fields into the stored row.
async fn save_settings(
    State(state): State<Arc<ServiceState>>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Value>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest(
            "No settings provided in request body.".to_string(),
        ));
    }
    patch
        .validate()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let mut settings = state.db.load_settings().await?;
    settings.apply(&patch);
    state.db.save_settings(&settings).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Settings saved.",
        "settings": settings,
    })))
}
