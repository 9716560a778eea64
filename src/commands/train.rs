use crate::config::build_http_client;
use crate::context::AppContext;
use crate::database::Database;
use crate::features::compute_features;
use crate::market_data::{MarketDataClient, TRAINING_RANGE};
use crate::ml::{
    build_bounds_dataset, build_direction_dataset, direction_model_name, direction_scaler_name,
    high_model_name, high_scaler_name, low_model_name, low_scaler_name, BoundModel,
    DirectionModel,
};
use crate::models::Asset;
use crate::retry::retry_operation;
use anyhow::Result;
use log::info;

/// Full training pipeline for both assets: download history, compute
/// features, train the direction classifier and the bound regressors,
/// then store all six artifacts per asset.
pub async fn run(app: &AppContext) -> Result<()> {
    let db = app.database().await?;
    let http = build_http_client()?;
    let market_data = MarketDataClient::new(&http);

    for asset in Asset::ALL {
        info!("Training models for {}", asset.label());
        let candles = market_data.download_history(asset, TRAINING_RANGE).await?;
        let rows = compute_features(&candles)?;
        info!(
            "Computed {} feature rows for {} after warmup trim",
            rows.len(),
            asset.label()
        );

        let (features, labels) = build_direction_dataset(&rows);
        let (direction, report) = DirectionModel::train(&features, &labels)?;
        info!(
            "{} direction model accuracy on the test split: {:.2}% ({} train / {} test rows)",
            asset.label(),
            report.test_accuracy * 100.0,
            report.train_rows,
            report.test_rows
        );
        let (model_bytes, scaler_bytes) = direction.to_artifacts()?;
        save_artifact(&db, &direction_model_name(asset), &model_bytes).await?;
        save_artifact(&db, &direction_scaler_name(asset), &scaler_bytes).await?;

        let (features, lows, highs) = build_bounds_dataset(&rows);
        let (bounds, report) = BoundModel::train(&features, &lows, &highs)?;
        info!(
            "{} bound models test MAE: low {:.2}, high {:.2}",
            asset.label(),
            report.low_test_mae,
            report.high_test_mae
        );
        let artifacts = bounds.to_artifacts()?;
        save_artifact(&db, &low_model_name(asset), &artifacts.low_model).await?;
        save_artifact(&db, &low_scaler_name(asset), &artifacts.low_scaler).await?;
        save_artifact(&db, &high_model_name(asset), &artifacts.high_model).await?;
        save_artifact(&db, &high_scaler_name(asset), &artifacts.high_scaler).await?;
    }

    info!("Training pipeline finished; all artifacts stored.");
    Ok(())
}

async fn save_artifact(db: &Database, name: &str, data: &[u8]) -> Result<()> {
    let store_context = format!("storing artifact {}", name);
    retry_operation!(store_context, async { db.upsert_artifact(name, data).await })?;
    info!("Stored artifact {} ({} bytes)", name, data.len());
    Ok(())
}
