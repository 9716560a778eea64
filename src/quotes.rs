use crate::config::ServiceConfig;
use crate::models::Asset;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;

const BINANCE_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/price";
const FMP_QUOTE_URL: &str = "https://financialmodelingprep.com/api/v3/quote/XAUUSD";
const BINANCE_SYMBOL: &str = "BTCUSDT";

/// Fetches live spot prices: Binance for Bitcoin, Financial Modeling
/// Prep for Gold.
pub struct QuoteClient<'a> {
    http: &'a Client,
    binance_api_key: Option<String>,
    fmp_api_key: Option<String>,
}

impl<'a> QuoteClient<'a> {
    pub fn new(http: &'a Client, config: &ServiceConfig) -> Self {
        Self {
            http,
            binance_api_key: config.binance_api_key.clone(),
            fmp_api_key: config.fmp_api_key.clone(),
        }
    }

    pub async fn spot(&self, asset: Asset) -> Result<f64> {
        match asset {
            Asset::Bitcoin => self.bitcoin_spot().await,
            Asset::Gold => self.gold_spot().await,
        }
    }

    async fn bitcoin_spot(&self) -> Result<f64> {
        let api_key = self
            .binance_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("BINANCE_API_KEY is not configured"))?;

        let response = self
            .http
            .get(BINANCE_TICKER_URL)
            .query(&[("symbol", BINANCE_SYMBOL)])
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .context("Binance ticker request failed")?
            .error_for_status()
            .context("Binance ticker request returned error")?;

        let ticker: BinanceTicker = response
            .json()
            .await
            .context("failed to parse Binance ticker response")?;
        ticker.parse_price()
    }

    async fn gold_spot(&self) -> Result<f64> {
        let api_key = self
            .fmp_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("FMP_API_KEY is not configured"))?;

        let response = self
            .http
            .get(FMP_QUOTE_URL)
            .query(&[("apikey", api_key)])
            .send()
            .await
            .context("FMP quote request failed")?
            .error_for_status()
            .context("FMP quote request returned error")?;

        let quotes: Vec<FmpQuote> = response
            .json()
            .await
            .context("failed to parse FMP quote response")?;
        first_quote_price(&quotes)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BinanceTicker {
    // Binance serializes the price as a string.
    price: String,
}

impl BinanceTicker {
    pub(crate) fn parse_price(&self) -> Result<f64> {
        self.price
            .trim()
            .parse::<f64>()
            .with_context(|| format!("unparseable Binance price: {}", self.price))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FmpQuote {
    price: f64,
}

pub(crate) fn first_quote_price(quotes: &[FmpQuote]) -> Result<f64> {
    quotes
        .first()
        .map(|quote| quote.price)
        .ok_or_else(|| anyhow!("FMP returned an empty quote list"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binance_price_string_is_parsed() {
        let ticker: BinanceTicker =
            serde_json::from_str(r#"{"symbol":"BTCUSDT","price":"65123.45000000"}"#).unwrap();
        assert!((ticker.parse_price().unwrap() - 65123.45).abs() < 1e-9);
    }

    #[test]
    fn garbage_binance_price_is_an_error() {
        let ticker: BinanceTicker =
            serde_json::from_str(r#"{"price":"not-a-number"}"#).unwrap();
        assert!(ticker.parse_price().is_err());
    }

    #[test]
    fn fmp_takes_the_first_quote() {
        let quotes: Vec<FmpQuote> = serde_json::from_str(
            r#"[{"symbol":"XAUUSD","price":2381.2},{"symbol":"XAUUSD","price":1.0}]"#,
        )
        .unwrap();
        assert_eq!(first_quote_price(&quotes).unwrap(), 2381.2);
    }

    #[test]
    fn empty_fmp_payload_is_an_error() {
        let quotes: Vec<FmpQuote> = serde_json::from_str("[]").unwrap();
        assert!(first_quote_price(&quotes).is_err());
    }
}
