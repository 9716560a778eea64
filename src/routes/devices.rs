use crate::error::ApiError;
use crate::server::ServiceState;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn routes() -> Router<Arc<ServiceState>> {
    Router::new().route("/register_device", post(register_device))
}

#[derive(Deserialize)]
struct RegisterDeviceBody {
    fcm_token: String,
}

/// POST /register_device: idempotent registration of an FCM token.
async fn register_device(
    State(state): State<Arc<ServiceState>>,
    Json(body): Json<RegisterDeviceBody>,
) -> Result<Json<Value>, ApiError> {
    let token = body.fcm_token.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("fcm_token must not be empty.".to_string()));
    }

    let inserted = state.db.register_device(token).await?;
    Ok(Json(json!({
        "status": "success",
        "registered": inserted,
    })))
}
