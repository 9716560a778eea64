use crate::error::ApiError;
use crate::models::{Asset, BalancePoint};
use crate::server::ServiceState;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<ServiceState>> {
    Router::new().route("/backtest_results", get(get_backtest_results))
}

#[derive(Deserialize)]
struct BacktestQuery {
    asset: String,
}

/// GET /backtest_results?asset=..: the stored balance history of the best
/// grid-search run for one asset.
async fn get_backtest_results(
    State(state): State<Arc<ServiceState>>,
    Query(query): Query<BacktestQuery>,
) -> Result<Json<Vec<BalancePoint>>, ApiError> {
    let asset: Asset = query
        .asset
        .parse()
        .map_err(|err: anyhow::Error| ApiError::BadRequest(err.to_string()))?;

    let history = state.db.get_backtest_history(asset).await?;
    Ok(Json(history))
}
