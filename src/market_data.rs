use crate::models::{Asset, Candle};
use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use log::info;
use reqwest::Client;
use serde::Deserialize;

const CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// History window used by the training pipeline.
pub const TRAINING_RANGE: &str = "1y";
/// History window used by backtests.
pub const BACKTEST_RANGE: &str = "2y";

/// Downloads daily OHLCV bars from the Yahoo Finance chart API.
pub struct MarketDataClient<'a> {
    http: &'a Client,
}

impl<'a> MarketDataClient<'a> {
    pub fn new(http: &'a Client) -> Self {
        Self { http }
    }

    pub async fn download_history(&self, asset: Asset, range: &str) -> Result<Vec<Candle>> {
        let ticker = asset.history_ticker();
        let url = format!("{}/{}", CHART_BASE_URL, ticker);
        let response = self
            .http
            .get(&url)
            .query(&[("range", range), ("interval", "1d")])
            .send()
            .await
            .with_context(|| format!("chart request for {} failed", ticker))?
            .error_for_status()
            .with_context(|| format!("chart request for {} returned error", ticker))?;

        let payload: ChartResponse = response
            .json()
            .await
            .with_context(|| format!("failed to parse chart response for {}", ticker))?;

        let candles = candles_from_chart(payload, ticker)?;
        info!(
            "Downloaded {} daily bars for {} ({})",
            candles.len(),
            asset.label(),
            range
        );
        Ok(candles)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Option<Vec<AdjCloseBlock>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    open: Option<Vec<Option<f64>>>,
    #[serde(default)]
    high: Option<Vec<Option<f64>>>,
    #[serde(default)]
    low: Option<Vec<Option<f64>>>,
    #[serde(default)]
    close: Option<Vec<Option<f64>>>,
    #[serde(default)]
    volume: Option<Vec<Option<i64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Flattens the columnar chart payload into candles, skipping rows with
/// missing OHLC values (holidays and partial bars arrive as nulls).
pub(crate) fn candles_from_chart(payload: ChartResponse, ticker: &str) -> Result<Vec<Candle>> {
    if let Some(error) = payload.chart.error {
        return Err(anyhow!(
            "chart API error for {}: {} {}",
            ticker,
            error.code.unwrap_or_default(),
            error.description.unwrap_or_default()
        ));
    }

    let result = payload
        .chart
        .result
        .and_then(|mut results| if results.is_empty() { None } else { Some(results.remove(0)) })
        .ok_or_else(|| anyhow!("No chart data returned for {}", ticker))?;

    let timestamps = result
        .timestamp
        .ok_or_else(|| anyhow!("Chart response for {} carries no timestamps", ticker))?;
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Chart response for {} carries no quote block", ticker))?;
    let adjclose = result
        .indicators
        .adjclose
        .and_then(|blocks| blocks.into_iter().next())
        .map(|block| block.adjclose);

    let opens = quote.open.unwrap_or_default();
    let highs = quote.high.unwrap_or_default();
    let lows = quote.low.unwrap_or_default();
    let closes = quote.close.unwrap_or_default();
    let volumes = quote.volume.unwrap_or_default();

    let mut candles = Vec::with_capacity(timestamps.len());
    for (i, unix) in timestamps.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close)) = (
            opens.get(i).copied().flatten(),
            highs.get(i).copied().flatten(),
            lows.get(i).copied().flatten(),
            closes.get(i).copied().flatten(),
        ) else {
            continue;
        };

        let date = Utc
            .timestamp_opt(*unix, 0)
            .single()
            .ok_or_else(|| anyhow!("Invalid bar timestamp {} for {}", unix, ticker))?;
        candles.push(Candle {
            date,
            open,
            high,
            low,
            close,
            adj_close: adjclose
                .as_ref()
                .and_then(|values| values.get(i).copied().flatten()),
            volume: volumes.get(i).copied().flatten().unwrap_or(0),
        });
    }

    if candles.is_empty() {
        return Err(anyhow!("No usable bars returned for {}", ticker));
    }

    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1704153600, 1704240000, 1704326400],
                "indicators": {
                    "quote": [{
                        "open": [100.0, 101.5, null],
                        "high": [102.0, 103.0, 104.0],
                        "low": [99.0, 100.5, 101.0],
                        "close": [101.0, 102.5, 103.0],
                        "volume": [1200, null, 900]
                    }],
                    "adjclose": [{ "adjclose": [100.8, 102.3, 102.9] }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_chart_payload_and_skips_null_rows() {
        let payload: ChartResponse = serde_json::from_str(FIXTURE).unwrap();
        let candles = candles_from_chart(payload, "BTC-USD").unwrap();
        // Third row has a null open and is dropped.
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 101.0);
        assert_eq!(candles[0].adj_close, Some(100.8));
        assert_eq!(candles[0].volume, 1200);
        assert_eq!(candles[1].volume, 0);
    }

    #[test]
    fn error_payload_is_surfaced() {
        let raw = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let payload: ChartResponse = serde_json::from_str(raw).unwrap();
        let err = candles_from_chart(payload, "GC=F").unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn empty_result_is_an_error() {
        let raw = r#"{"chart":{"result":[],"error":null}}"#;
        let payload: ChartResponse = serde_json::from_str(raw).unwrap();
        assert!(candles_from_chart(payload, "BTC-USD").is_err());
    }
}
