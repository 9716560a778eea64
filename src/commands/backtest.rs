use crate::backtester::{
    run_grid_search, summarize, DEFAULT_ENTRY_THRESHOLDS, DEFAULT_SL_MULTIPLIERS,
};
use crate::config::build_http_client;
use crate::context::AppContext;
use crate::database::Database;
use crate::features::compute_features;
use crate::market_data::{MarketDataClient, BACKTEST_RANGE};
use crate::ml::{
    high_model_name, high_scaler_name, low_model_name, low_scaler_name, BoundArtifacts,
    BoundModel,
};
use crate::models::Asset;
use crate::retry::retry_operation;
use anyhow::{anyhow, Result};
use log::{info, warn};

/// Grid-searches the walk-forward simulator per asset and persists the
/// winning balance history. Assets fail independently; the command only
/// errors when no asset could be backtested.
pub async fn run(app: &AppContext, entry_thresholds: &[f64], sl_multipliers: &[f64]) -> Result<()> {
    let mut db = app.database().await?;
    let http = build_http_client()?;
    let market_data = MarketDataClient::new(&http);

    let thresholds: Vec<f64> = if entry_thresholds.is_empty() {
        DEFAULT_ENTRY_THRESHOLDS.to_vec()
    } else {
        entry_thresholds.to_vec()
    };
    let multipliers: Vec<f64> = if sl_multipliers.is_empty() {
        DEFAULT_SL_MULTIPLIERS.to_vec()
    } else {
        sl_multipliers.to_vec()
    };

    let mut failed = 0usize;
    for asset in Asset::ALL {
        if let Err(err) =
            backtest_asset(&mut db, &market_data, asset, &thresholds, &multipliers).await
        {
            warn!("Backtest for {} failed: {}", asset.label(), err);
            failed += 1;
        }
    }

    if failed == Asset::ALL.len() {
        return Err(anyhow!("Backtest failed for every asset"));
    }
    Ok(())
}

async fn backtest_asset(
    db: &mut Database,
    market_data: &MarketDataClient<'_>,
    asset: Asset,
    thresholds: &[f64],
    multipliers: &[f64],
) -> Result<()> {
    let bounds = load_bound_model(db, asset).await?;
    let candles = market_data.download_history(asset, BACKTEST_RANGE).await?;
    let rows = compute_features(&candles)?;

    info!(
        "Running {} grid search over {} bars ({} thresholds x {} multipliers)",
        asset.label(),
        rows.len(),
        thresholds.len(),
        multipliers.len()
    );
    let best = run_grid_search(&rows, &bounds, thresholds, multipliers)?;
    let summary = summarize(&best);
    info!(
        "Best {} run: entry>{:.1}% sl={:.1}x ATR -> final capital {:.2} ({} trades, return {:.2}%, max drawdown {:.2}%, Sharpe {:.2})",
        asset.label(),
        best.params.entry_threshold_percent,
        best.params.sl_atr_multiplier,
        best.final_capital,
        best.closed_trades,
        summary.total_return_percent,
        summary.max_drawdown_percent,
        summary.sharpe_ratio
    );

    let persist_context = format!("persisting {} backtest history", asset.label());
    retry_operation!(persist_context, async {
        db.replace_backtest_history(asset, &best.history).await
    })?;
    info!(
        "Stored best {} backtest history ({} points)",
        asset.label(),
        best.history.len()
    );
    Ok(())
}

async fn load_bound_model(db: &Database, asset: Asset) -> Result<BoundModel> {
    let artifacts = BoundArtifacts {
        low_model: require_artifact(db, &low_model_name(asset)).await?,
        low_scaler: require_artifact(db, &low_scaler_name(asset)).await?,
        high_model: require_artifact(db, &high_model_name(asset)).await?,
        high_scaler: require_artifact(db, &high_scaler_name(asset)).await?,
    };
    BoundModel::from_artifacts(&artifacts)
}

async fn require_artifact(db: &Database, name: &str) -> Result<Vec<u8>> {
    db.get_artifact(name)
        .await?
        .ok_or_else(|| anyhow!("Artifact '{}' not found in the store. Run `pulse train` first.", name))
}
