use crate::config::build_http_client;
use crate::context::AppContext;
use crate::server::{self, ServiceState};
use anyhow::Result;
use log::warn;
use std::sync::Arc;

pub async fn run(app: &AppContext, port: Option<u16>) -> Result<()> {
    let db = app.database().await?;
    let http = build_http_client()?;
    let config = app.config().clone();
    let resolved_port = port.unwrap_or(config.port);

    if config.binance_api_key.is_none() {
        warn!("BINANCE_API_KEY is not set; Bitcoin quotes will fail.");
    }
    if config.fmp_api_key.is_none() {
        warn!("FMP_API_KEY is not set; Gold quotes will fail.");
    }
    if config.fcm_server_key.is_none() {
        warn!("FCM_SERVER_KEY is not set; push notifications are disabled.");
    }

    let state = Arc::new(ServiceState::new(db, http, config));
    state.load_direction_models().await;

    server::serve(state, resolved_port).await
}
