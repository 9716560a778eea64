use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One daily price bar as downloaded from the chart API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: Option<f64>,
    pub volume: i64,
}

impl Candle {
    /// Price series used for feature engineering. Falls back to the raw
    /// close when the provider returned no adjusted series.
    pub fn feature_price(&self) -> f64 {
        self.adj_close.unwrap_or(self.close)
    }
}

/// The two assets the service tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Bitcoin,
    Gold,
}

impl Asset {
    pub const ALL: [Asset; 2] = [Asset::Bitcoin, Asset::Gold];

    /// Ticker used for historical bar downloads.
    pub fn history_ticker(&self) -> &'static str {
        match self {
            Asset::Bitcoin => "BTC-USD",
            Asset::Gold => "GC=F",
        }
    }

    /// Prefix under which this asset's model artifacts are stored.
    pub fn model_prefix(&self) -> &'static str {
        match self {
            Asset::Bitcoin => "btc",
            Asset::Gold => "gold",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Asset::Bitcoin => "Bitcoin",
            Asset::Gold => "Gold",
        }
    }
}

impl FromStr for Asset {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "btc" | "btc-usd" | "bitcoin" => Ok(Asset::Bitcoin),
            "gold" | "gc=f" | "xauusd" => Ok(Asset::Gold),
            other => Err(anyhow!("Unknown asset: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
        }
    }
}

impl FromStr for SignalAction {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(SignalAction::Buy),
            "sell" => Ok(SignalAction::Sell),
            other => Err(anyhow!("Unknown signal action: {}", other)),
        }
    }
}

/// The singleton settings row: risk parameters per asset, the refresh
/// interval and the last signal observed per asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSettings {
    pub bitcoin_tp_percentage: f64,
    pub bitcoin_sl_percentage: f64,
    pub xauusd_tp_percentage: f64,
    pub xauusd_sl_percentage: f64,
    pub update_interval_minutes: i32,
    pub last_btc_signal: String,
    pub last_gold_signal: String,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            bitcoin_tp_percentage: 2.5,
            bitcoin_sl_percentage: 1.5,
            xauusd_tp_percentage: 1.8,
            xauusd_sl_percentage: 0.8,
            update_interval_minutes: 15,
            last_btc_signal: "N/A".to_string(),
            last_gold_signal: "N/A".to_string(),
        }
    }
}

impl RiskSettings {
    pub fn tp_percentage(&self, asset: Asset) -> f64 {
        match asset {
            Asset::Bitcoin => self.bitcoin_tp_percentage,
            Asset::Gold => self.xauusd_tp_percentage,
        }
    }

    pub fn sl_percentage(&self, asset: Asset) -> f64 {
        match asset {
            Asset::Bitcoin => self.bitcoin_sl_percentage,
            Asset::Gold => self.xauusd_sl_percentage,
        }
    }

    pub fn last_signal(&self, asset: Asset) -> &str {
        match asset {
            Asset::Bitcoin => &self.last_btc_signal,
            Asset::Gold => &self.last_gold_signal,
        }
    }

    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(value) = patch.bitcoin_tp_percentage {
            self.bitcoin_tp_percentage = value;
        }
        if let Some(value) = patch.bitcoin_sl_percentage {
            self.bitcoin_sl_percentage = value;
        }
        if let Some(value) = patch.xauusd_tp_percentage {
            self.xauusd_tp_percentage = value;
        }
        if let Some(value) = patch.xauusd_sl_percentage {
            self.xauusd_sl_percentage = value;
        }
        if let Some(value) = patch.update_interval_minutes {
            self.update_interval_minutes = value;
        }
    }
}

/// Partial update body for `POST /save_settings`. Unknown fields are
/// ignored; only present fields are merged into the stored row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub bitcoin_tp_percentage: Option<f64>,
    pub bitcoin_sl_percentage: Option<f64>,
    pub xauusd_tp_percentage: Option<f64>,
    pub xauusd_sl_percentage: Option<f64>,
    pub update_interval_minutes: Option<i32>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.bitcoin_tp_percentage.is_none()
            && self.bitcoin_sl_percentage.is_none()
            && self.xauusd_tp_percentage.is_none()
            && self.xauusd_sl_percentage.is_none()
            && self.update_interval_minutes.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("bitcoin_tp_percentage", self.bitcoin_tp_percentage),
            ("bitcoin_sl_percentage", self.bitcoin_sl_percentage),
            ("xauusd_tp_percentage", self.xauusd_tp_percentage),
            ("xauusd_sl_percentage", self.xauusd_sl_percentage),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value <= 0.0 {
                    return Err(anyhow!("{} must be a positive number", name));
                }
            }
        }
        if let Some(minutes) = self.update_interval_minutes {
            if minutes < 1 {
                return Err(anyhow!("update_interval_minutes must be >= 1"));
            }
        }
        Ok(())
    }
}

/// Per-asset block of the `GET /get_signals` response. On failure the
/// numeric fields stay empty and `signal_type` carries an error marker.
#[derive(Debug, Clone, Serialize)]
pub struct AssetSignal {
    pub price: Option<f64>,
    pub entry: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub signal_type: String,
}

impl AssetSignal {
    pub fn failed(marker: impl Into<String>) -> Self {
        Self {
            price: None,
            entry: None,
            take_profit: None,
            stop_loss: None,
            signal_type: marker.into(),
        }
    }

    pub fn action(&self) -> Option<SignalAction> {
        self.signal_type.parse().ok()
    }
}

/// Full `GET /get_signals` payload.
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub bitcoin: AssetSignal,
    pub gold: AssetSignal,
    pub settings: RiskSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_error: Option<String>,
}

impl SignalReport {
    pub fn signal(&self, asset: Asset) -> &AssetSignal {
        match asset {
            Asset::Bitcoin => &self.bitcoin,
            Asset::Gold => &self.gold,
        }
    }
}

/// One point of a persisted backtest balance history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancePoint {
    pub date: NaiveDate,
    pub balance: f64,
}

/// A registered push-notification device.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: i32,
    pub fcm_token: String,
    pub registered_at: DateTime<Utc>,
}
