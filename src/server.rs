use crate::config::ServiceConfig;
use crate::database::Database;
use crate::features::compute_features;
use crate::market_data::{MarketDataClient, TRAINING_RANGE};
use crate::ml::{direction_model_name, direction_scaler_name, DirectionModel};
use crate::models::{Asset, AssetSignal, RiskSettings, SignalReport};
use crate::quotes::QuoteClient;
use crate::routes;
use crate::signal::build_asset_signal;
use crate::updater;
use anyhow::{anyhow, Context, Result};
use axum::Router;
use log::{info, warn};
use reqwest::Client;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Shared state behind every route handler and the updater task.
pub struct ServiceState {
    pub db: Database,
    pub http: Client,
    pub config: ServiceConfig,
    direction_models: RwLock<HashMap<Asset, DirectionModel>>,
    latest_features: RwLock<HashMap<Asset, Vec<f64>>>,
}

impl ServiceState {
    pub fn new(db: Database, http: Client, config: ServiceConfig) -> Self {
        Self {
            db,
            http,
            config,
            direction_models: RwLock::new(HashMap::new()),
            latest_features: RwLock::new(HashMap::new()),
        }
    }

    /// Loads the direction artifacts from the store. Missing artifacts
    /// only degrade signals, they never stop the server.
    pub async fn load_direction_models(&self) {
        for asset in Asset::ALL {
            match self.load_direction_model(asset).await {
                Ok(model) => {
                    self.direction_models.write().await.insert(asset, model);
                    info!("Loaded direction model for {}", asset.label());
                }
                Err(err) => {
                    warn!(
                        "Direction model for {} unavailable: {}. Signals will degrade until `pulse train` runs.",
                        asset.label(),
                        err
                    );
                }
            }
        }
    }

    async fn load_direction_model(&self, asset: Asset) -> Result<DirectionModel> {
        let model_name = direction_model_name(asset);
        let scaler_name = direction_scaler_name(asset);
        let model_bytes = self
            .db
            .get_artifact(&model_name)
            .await?
            .ok_or_else(|| anyhow!("artifact {} not found", model_name))?;
        let scaler_bytes = self
            .db
            .get_artifact(&scaler_name)
            .await?
            .ok_or_else(|| anyhow!("artifact {} not found", scaler_name))?;
        DirectionModel::from_artifacts(&model_bytes, &scaler_bytes)
    }

    /// Refreshes the per-asset feature snapshot from freshly downloaded
    /// history. Failures are per-asset and keep the previous snapshot.
    pub async fn refresh_features(&self) {
        let market_data = MarketDataClient::new(&self.http);
        for asset in Asset::ALL {
            let rows = match market_data
                .download_history(asset, TRAINING_RANGE)
                .await
                .and_then(|candles| compute_features(&candles))
            {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(
                        "Feature refresh for {} failed: {}. Keeping the previous snapshot.",
                        asset.label(),
                        err
                    );
                    continue;
                }
            };
            if let Some(row) = rows.last() {
                self.latest_features
                    .write()
                    .await
                    .insert(asset, row.model_features());
            }
        }
    }

    /// Computes the full signal report. Per-asset failures degrade that
    /// asset's block and surface in `global_error`; only a settings read
    /// failure is fatal.
    pub async fn compute_signal_report(&self) -> Result<SignalReport> {
        let settings = self
            .db
            .load_settings()
            .await
            .context("failed to load settings")?;

        let mut global_error = String::new();
        let bitcoin = self
            .signal_or_degrade(Asset::Bitcoin, &settings, &mut global_error)
            .await;
        let gold = self
            .signal_or_degrade(Asset::Gold, &settings, &mut global_error)
            .await;

        Ok(SignalReport {
            bitcoin,
            gold,
            settings,
            global_error: if global_error.is_empty() {
                None
            } else {
                Some(global_error.trim_end().to_string())
            },
        })
    }

    async fn signal_or_degrade(
        &self,
        asset: Asset,
        settings: &RiskSettings,
        global_error: &mut String,
    ) -> AssetSignal {
        match self.asset_signal(asset, settings).await {
            Ok(signal) => signal,
            Err(err) => {
                global_error.push_str(&format!("{}: {}. ", asset.label(), err));
                AssetSignal::failed("error")
            }
        }
    }

    async fn asset_signal(&self, asset: Asset, settings: &RiskSettings) -> Result<AssetSignal> {
        let features = self
            .latest_features
            .read()
            .await
            .get(&asset)
            .cloned()
            .ok_or_else(|| anyhow!("no feature snapshot yet"))?;

        let quotes = QuoteClient::new(&self.http, &self.config);
        let price = quotes.spot(asset).await?;

        let models = self.direction_models.read().await;
        let model = models
            .get(&asset)
            .ok_or_else(|| anyhow!("direction model not loaded"))?;
        let action = model.predict(&features)?;

        Ok(build_asset_signal(asset, price, action, settings))
    }
}

/// Runs the HTTP API plus the periodic updater until interrupted.
pub async fn serve(state: Arc<ServiceState>, port: u16) -> Result<()> {
    tokio::spawn(updater::run(Arc::clone(&state)));

    let app = Router::new()
        .merge(routes::api_router())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", port)
        .parse()
        .context("invalid bind address")?;
    info!("pulse listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", err);
        return;
    }
    info!("Shutdown signal received, stopping.");
}
