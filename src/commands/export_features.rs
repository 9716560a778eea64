use crate::config::build_http_client;
use crate::features::{compute_features, write_features_csv};
use crate::market_data::{MarketDataClient, TRAINING_RANGE};
use crate::models::Asset;
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

/// Writes one featured CSV per asset into the output directory. Needs no
/// database, only network access to the chart API.
pub async fn run(output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let http = build_http_client()?;
    let market_data = MarketDataClient::new(&http);

    for asset in Asset::ALL {
        let candles = market_data.download_history(asset, TRAINING_RANGE).await?;
        let rows = compute_features(&candles)?;
        let path = output_dir.join(format!("{}_data_with_features.csv", asset.model_prefix()));
        write_features_csv(&rows, &path)?;
        info!(
            "Wrote {} feature rows for {} to {}",
            rows.len(),
            asset.label(),
            path.display()
        );
    }

    Ok(())
}
