/// Rolling simple moving average. The first `period - 1` slots are NaN so
/// warmup rows can be dropped by the feature builder.
pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() || period == 0 {
        return vec![f64::NAN; prices.len()];
    }
    if prices.len() < period {
        return vec![f64::NAN; prices.len()];
    }

    let mut sma_values = vec![f64::NAN; period - 1];
    let mut window_sum: f64 = prices[..period].iter().sum();
    sma_values.push(window_sum / period as f64);
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        sma_values.push(window_sum / period as f64);
    }

    sma_values
}

/// Exponential moving average seeded with the first value.
pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_values = Vec::with_capacity(prices.len());
    ema_values.push(prices[0]);

    for i in 1..prices.len() {
        let ema = (prices[i] * multiplier) + (ema_values[i - 1] * (1.0 - multiplier));
        ema_values.push(ema);
    }

    ema_values
}

/// MACD line, signal line and histogram.
pub fn calculate_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = calculate_ema(prices, fast_period);
    let slow_ema = calculate_ema(prices, slow_period);

    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(fast, slow)| fast - slow)
        .collect();

    let signal_line = calculate_ema(&macd_line, signal_period);

    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(line, signal)| line - signal)
        .collect();

    (macd_line, signal_line, histogram)
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Relative strength index with Wilder smoothing. NaN until the first
/// full period is available.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut rsi_values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return rsi_values;
    }

    let mut sum_gain = 0.0f64;
    let mut sum_loss = 0.0f64;
    for i in 1..=period {
        let delta = prices[i] - prices[i - 1];
        if delta >= 0.0 {
            sum_gain += delta;
        } else {
            sum_loss += -delta;
        }
    }

    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    rsi_values[period] = rsi_from_avgs(avg_gain, avg_loss);

    for i in (period + 1)..prices.len() {
        let delta = prices[i] - prices[i - 1];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi_values[i] = rsi_from_avgs(avg_gain, avg_loss);
    }

    rsi_values
}

/// Average true range with Wilder smoothing (the `ATRr` variant used for
/// stop-loss placement). NaN until the first full period is available.
pub fn calculate_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = highs.len();
    let mut atr_values = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return atr_values;
    }

    let mut tr_values = Vec::with_capacity(n - 1);
    for i in 1..n {
        let tr = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
        tr_values.push(tr);
    }

    // Seed with the plain average of the first window, then smooth.
    let mut atr = tr_values[..period].iter().sum::<f64>() / period as f64;
    atr_values[period] = atr;
    for i in (period + 1)..n {
        atr = (atr * (period as f64 - 1.0) + tr_values[i - 1]) / period as f64;
        atr_values[i] = atr;
    }

    atr_values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_matches_rolling_mean() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let sma = calculate_sma(&prices, 3);
        assert!(sma[0].is_nan());
        assert!(sma[1].is_nan());
        assert_eq!(sma[2], 2.0);
        assert_eq!(sma[3], 3.0);
        assert_eq!(sma[4], 4.0);
    }

    #[test]
    fn rsi_saturates_on_monotonic_series() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let rsi = calculate_rsi(&rising, 14);
        assert!(rsi[13].is_nan());
        assert_eq!(rsi[14], 100.0);
        assert_eq!(*rsi.last().unwrap(), 100.0);

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let rsi = calculate_rsi(&falling, 14);
        assert_eq!(*rsi.last().unwrap(), 0.0);
    }

    #[test]
    fn atr_is_constant_for_constant_ranges() {
        let n = 40;
        let highs = vec![102.0; n];
        let lows = vec![98.0; n];
        let closes = vec![100.0; n];
        let atr = calculate_atr(&highs, &lows, &closes, 14);
        assert!(atr[13].is_nan());
        for value in &atr[14..] {
            assert!((value - 4.0).abs() < 1e-9);
        }
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let (line, signal, hist) = calculate_macd(&prices, 12, 26, 9);
        assert_eq!(line.len(), prices.len());
        for i in 0..prices.len() {
            assert!((hist[i] - (line[i] - signal[i])).abs() < 1e-12);
        }
    }
}
