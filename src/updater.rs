use crate::models::{Asset, RiskSettings, SignalAction};
use crate::notifier::Notifier;
use crate::retry::retry_operation;
use crate::server::ServiceState;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Periodic loop: refresh features, recompute both signals, persist and
/// push on change, then sleep for the configured interval. Runs once
/// immediately so the API serves fresh data right after startup.
pub async fn run(state: Arc<ServiceState>) {
    loop {
        state.refresh_features().await;

        if let Err(err) = tick(&state).await {
            warn!("Signal update tick failed: {}", err);
        }

        let minutes = match state.db.load_settings().await {
            Ok(settings) => settings.update_interval_minutes.max(1) as u64,
            Err(err) => {
                warn!("Failed to read update interval, using default: {}", err);
                RiskSettings::default().update_interval_minutes as u64
            }
        };
        tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
    }
}

async fn tick(state: &ServiceState) -> anyhow::Result<()> {
    let report = state.compute_signal_report().await?;
    if let Some(error) = &report.global_error {
        warn!("Signal computation degraded: {}", error);
    }

    for asset in Asset::ALL {
        let block = report.signal(asset);
        let Some(action) = block.action() else {
            continue;
        };

        let previous = report.settings.last_signal(asset);
        if previous == action.as_str() {
            continue;
        }

        info!(
            "{} signal changed: {} -> {}",
            asset.label(),
            previous,
            action.as_str()
        );
        let update_context = format!("recording {} signal change", asset.label());
        retry_operation!(update_context, async {
            state.db.update_last_signal(asset, action.as_str()).await
        })?;

        notify_change(state, asset, action, block.price).await;
    }

    Ok(())
}

async fn notify_change(state: &ServiceState, asset: Asset, action: SignalAction, price: Option<f64>) {
    let Some(server_key) = state.config.fcm_server_key.clone() else {
        info!("FCM_SERVER_KEY not configured; skipping push notification.");
        return;
    };

    let title = format!("{} signal changed", asset.label());
    let body = match price {
        Some(price) => format!("{}: {} @ {}", asset.label(), action.as_str(), price),
        None => format!("{}: {}", asset.label(), action.as_str()),
    };

    let notifier = Notifier::new(&state.http, server_key);
    if let Err(err) = notifier.broadcast(&state.db, &title, &body).await {
        warn!("Push notification for {} failed: {}", asset.label(), err);
    }
}
