use anyhow::{Context, Result};
use reqwest::Client;
use std::env;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("pulse/", env!("CARGO_PKG_VERSION"));

/// Environment-derived configuration. Risk parameters live in the
/// database; only credentials and the listen port come from the
/// environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub binance_api_key: Option<String>,
    pub fmp_api_key: Option<String>,
    pub fcm_server_key: Option<String>,
    pub port: u16,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|raw| raw.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            binance_api_key: non_empty(env::var("BINANCE_API_KEY").ok()),
            fmp_api_key: non_empty(env::var("FMP_API_KEY").ok()),
            fcm_server_key: non_empty(env::var("FCM_SERVER_KEY").ok()),
            port,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

/// Shared HTTP client for market data, quote and push requests.
pub fn build_http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}
