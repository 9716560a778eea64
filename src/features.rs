use crate::indicators::{calculate_atr, calculate_macd, calculate_rsi, calculate_sma};
use crate::models::Candle;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const SHORT_SMA_WINDOW: usize = 10;
pub const LONG_SMA_WINDOW: usize = 50;
pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// Columns fed to the models, in order.
pub const MODEL_FEATURES: [&str; 5] = ["daily_return", "sma_10", "sma_50", "sma_signal", "rsi_14"];

/// Rows before the long SMA is defined carry NaNs and are dropped.
const WARMUP_ROWS: usize = LONG_SMA_WINDOW - 1;

/// One bar with its derived indicator columns, produced after the warmup
/// trim so every value is finite.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub daily_return: f64,
    pub sma_10: f64,
    pub sma_50: f64,
    pub sma_signal: f64,
    pub rsi_14: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub atr_14: f64,
}

impl FeatureRow {
    /// The feature vector consumed by the classifier and bound regressors,
    /// ordered as `MODEL_FEATURES`.
    pub fn model_features(&self) -> Vec<f64> {
        vec![
            self.daily_return,
            self.sma_10,
            self.sma_50,
            self.sma_signal,
            self.rsi_14,
        ]
    }
}

/// Derives the indicator columns over the adjusted close series and drops
/// warmup rows that carry undefined values.
pub fn compute_features(candles: &[Candle]) -> Result<Vec<FeatureRow>> {
    if candles.len() <= WARMUP_ROWS + 1 {
        return Err(anyhow!(
            "Not enough bars to compute features: got {}, need more than {}",
            candles.len(),
            WARMUP_ROWS + 1
        ));
    }

    let prices: Vec<f64> = candles.iter().map(Candle::feature_price).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let sma_short = calculate_sma(&prices, SHORT_SMA_WINDOW);
    let sma_long = calculate_sma(&prices, LONG_SMA_WINDOW);
    let rsi = calculate_rsi(&prices, RSI_PERIOD);
    let (macd_line, macd_signal_line, macd_hist) =
        calculate_macd(&prices, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let atr = calculate_atr(&highs, &lows, &closes, ATR_PERIOD);

    let mut rows = Vec::with_capacity(candles.len() - WARMUP_ROWS);
    for i in WARMUP_ROWS..candles.len() {
        let daily_return = if i == 0 || prices[i - 1] == 0.0 {
            f64::NAN
        } else {
            (prices[i] - prices[i - 1]) / prices[i - 1]
        };

        let values = [
            daily_return,
            sma_short[i],
            sma_long[i],
            rsi[i],
            macd_line[i],
            macd_signal_line[i],
            macd_hist[i],
            atr[i],
        ];
        if values.iter().any(|value| !value.is_finite()) {
            continue;
        }

        let sma_signal = if sma_short[i] > sma_long[i] { 1.0 } else { 0.0 };
        rows.push(FeatureRow {
            date: candles[i].date,
            open: candles[i].open,
            high: candles[i].high,
            low: candles[i].low,
            close: candles[i].close,
            daily_return,
            sma_10: sma_short[i],
            sma_50: sma_long[i],
            sma_signal,
            rsi_14: rsi[i],
            macd: macd_line[i],
            macd_signal: macd_signal_line[i],
            macd_hist: macd_hist[i],
            atr_14: atr[i],
        });
    }

    if rows.is_empty() {
        return Err(anyhow!("All feature rows were dropped during warmup"));
    }

    Ok(rows)
}

/// Writes the featured data to CSV, one row per bar.
pub fn write_features_csv<P: AsRef<Path>>(rows: &[FeatureRow], path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create feature CSV at {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writeln!(
        writer,
        "date,open,high,low,close,daily_return,sma_10,sma_50,sma_signal,rsi_14,macd,macd_signal,macd_hist,atr_14"
    )?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            row.date.format("%Y-%m-%d"),
            row.open,
            row.high,
            row.low,
            row.close,
            row.daily_return,
            row.sma_10,
            row.sma_50,
            row.sma_signal,
            row.rsi_14,
            row.macd,
            row.macd_signal,
            row.macd_hist,
            row.atr_14,
        )?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// Deterministic synthetic daily bars with a mild trend and wobble.
    pub(crate) fn synthetic_candles(count: usize) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let drift = i as f64 * 0.4;
                let wobble = (i as f64 * 0.7).sin() * 3.0;
                let close = 100.0 + drift + wobble;
                let open = close - 0.5;
                Candle {
                    date: base + Duration::days(i as i64),
                    open,
                    high: close + 1.5,
                    low: open - 1.5,
                    close,
                    adj_close: Some(close),
                    volume: 1_000 + i as i64,
                }
            })
            .collect()
    }

    #[test]
    fn warmup_rows_are_trimmed() {
        let candles = synthetic_candles(120);
        let rows = compute_features(&candles).unwrap();
        assert_eq!(rows.len(), candles.len() - (LONG_SMA_WINDOW - 1));
        assert_eq!(rows[0].date, candles[LONG_SMA_WINDOW - 1].date);
        for row in &rows {
            assert!(row.daily_return.is_finite());
            assert!(row.atr_14.is_finite());
            assert!(row.sma_signal == 0.0 || row.sma_signal == 1.0);
        }
    }

    #[test]
    fn daily_return_matches_adjacent_closes() {
        let candles = synthetic_candles(80);
        let rows = compute_features(&candles).unwrap();
        let i = LONG_SMA_WINDOW - 1;
        let expected = (candles[i].close - candles[i - 1].close) / candles[i - 1].close;
        assert!((rows[0].daily_return - expected).abs() < 1e-12);
    }

    #[test]
    fn model_feature_vector_is_ordered() {
        let candles = synthetic_candles(80);
        let rows = compute_features(&candles).unwrap();
        let row = &rows[5];
        let features = row.model_features();
        assert_eq!(features.len(), MODEL_FEATURES.len());
        assert_eq!(features[1], row.sma_10);
        assert_eq!(features[4], row.rsi_14);
    }

    #[test]
    fn too_short_series_is_rejected() {
        let candles = synthetic_candles(30);
        assert!(compute_features(&candles).is_err());
    }
}
