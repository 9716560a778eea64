use crate::features::FeatureRow;
use crate::ml::BoundPredictor;
use crate::models::BalancePoint;
use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rayon::prelude::*;
use statrs::statistics::Statistics;

pub const INITIAL_CAPITAL: f64 = 100.0;
pub const DEFAULT_ENTRY_THRESHOLDS: [f64; 3] = [3.0, 5.0, 7.0];
pub const DEFAULT_SL_MULTIPLIERS: [f64; 3] = [1.0, 1.5, 2.0];

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// One cell of the parameter grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestParams {
    pub entry_threshold_percent: f64,
    pub sl_atr_multiplier: f64,
}

/// Result of a single walk-forward simulation.
#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub params: BacktestParams,
    pub final_capital: f64,
    pub closed_trades: usize,
    pub history: Vec<BalancePoint>,
}

#[derive(Debug, Clone, Copy)]
pub struct BacktestSummary {
    pub total_return_percent: f64,
    pub max_drawdown_percent: f64,
    pub sharpe_ratio: f64,
}

/// Walk-forward trade simulation over featured bars.
///
/// Two states: flat and in-trade. Exits are evaluated against the next
/// bar before new entries, and the stop-loss is checked before the
/// take-profit on the same bar. Capital compounds multiplicatively on
/// every exit. After an exit the same iteration may re-enter using the
/// current bar's prediction, entering at the next bar's open.
pub fn run_simulation(
    rows: &[FeatureRow],
    predictor: &dyn BoundPredictor,
    params: BacktestParams,
) -> Result<BacktestRun> {
    if rows.len() < 2 {
        return Err(anyhow!(
            "Backtest needs at least two featured bars, got {}",
            rows.len()
        ));
    }

    let mut capital = INITIAL_CAPITAL;
    let mut in_trade = false;
    let mut entry_price = 0.0;
    let mut take_profit_target = 0.0;
    let mut stop_loss_target = 0.0;
    let mut closed_trades = 0usize;
    let mut history = Vec::with_capacity(rows.len() - 1);

    for i in 0..rows.len() - 1 {
        let current_day = &rows[i];
        let next_day = &rows[i + 1];

        if in_trade {
            if next_day.low <= stop_loss_target {
                capital *= stop_loss_target / entry_price;
                in_trade = false;
                closed_trades += 1;
            } else if next_day.high >= take_profit_target {
                capital *= take_profit_target / entry_price;
                in_trade = false;
                closed_trades += 1;
            }
        }

        if !in_trade {
            let features = current_day.model_features();
            let predicted_low = predictor.predict_low(&features)?;
            let predicted_high = predictor.predict_high(&features)?;

            let spread_percent = if predicted_low > 0.0 {
                ((predicted_high / predicted_low) - 1.0) * 100.0
            } else {
                f64::NEG_INFINITY
            };
            if spread_percent > params.entry_threshold_percent && next_day.open > 0.0 {
                in_trade = true;
                entry_price = next_day.open;
                take_profit_target = predicted_high;
                stop_loss_target = predicted_low - current_day.atr_14 * params.sl_atr_multiplier;
            }
        }

        history.push(BalancePoint {
            date: current_day.date.date_naive(),
            balance: capital,
        });
    }

    Ok(BacktestRun {
        params,
        final_capital: capital,
        closed_trades,
        history,
    })
}

/// Runs every (entry-threshold, stop-loss-multiplier) combination and
/// returns the run with the highest final capital.
pub fn run_grid_search(
    rows: &[FeatureRow],
    predictor: &(dyn BoundPredictor + Sync),
    entry_thresholds: &[f64],
    sl_multipliers: &[f64],
) -> Result<BacktestRun> {
    let grid: Vec<BacktestParams> = entry_thresholds
        .iter()
        .flat_map(|threshold| {
            sl_multipliers.iter().map(move |multiplier| BacktestParams {
                entry_threshold_percent: *threshold,
                sl_atr_multiplier: *multiplier,
            })
        })
        .collect();
    if grid.is_empty() {
        return Err(anyhow!("Backtest grid is empty"));
    }

    let pb = ProgressBar::new(grid.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let runs: Result<Vec<BacktestRun>> = grid
        .par_iter()
        .map(|params| {
            let run = run_simulation(rows, predictor, *params);
            pb.inc(1);
            run
        })
        .collect();
    let runs = runs?;
    pb.finish_and_clear();

    for run in &runs {
        info!(
            "Grid cell entry>{:.1}% sl={:.1}x ATR -> final capital {:.2} ({} trades)",
            run.params.entry_threshold_percent,
            run.params.sl_atr_multiplier,
            run.final_capital,
            run.closed_trades
        );
    }

    runs.into_iter()
        .max_by(|a, b| {
            a.final_capital
                .partial_cmp(&b.final_capital)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or_else(|| anyhow!("Grid search produced no runs"))
}

/// Summary statistics over the balance history of one run.
pub fn summarize(run: &BacktestRun) -> BacktestSummary {
    let total_return_percent = (run.final_capital / INITIAL_CAPITAL - 1.0) * 100.0;

    let mut max_drawdown_percent = 0.0f64;
    let mut peak = f64::NEG_INFINITY;
    for point in &run.history {
        if point.balance > peak {
            peak = point.balance;
        } else if peak > 0.0 {
            let drawdown = (peak - point.balance) / peak * 100.0;
            if drawdown > max_drawdown_percent {
                max_drawdown_percent = drawdown;
            }
        }
    }

    let returns: Vec<f64> = run
        .history
        .windows(2)
        .filter(|window| window[0].balance > 0.0)
        .map(|window| (window[1].balance - window[0].balance) / window[0].balance)
        .collect();
    let sharpe_ratio = if returns.len() < 2 {
        0.0
    } else {
        let mean = returns.clone().mean();
        let std_dev = returns.std_dev();
        if std_dev == 0.0 {
            0.0
        } else {
            (mean * TRADING_DAYS_PER_YEAR) / (std_dev * TRADING_DAYS_PER_YEAR.sqrt())
        }
    };

    BacktestSummary {
        total_return_percent,
        max_drawdown_percent,
        sharpe_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// Deterministic predictor: bounds are looked up by the marker value
    /// the test plants in the `daily_return` feature slot.
    struct ScriptedBounds {
        bounds: Vec<(f64, f64)>,
    }

    impl BoundPredictor for ScriptedBounds {
        fn predict_low(&self, features: &[f64]) -> Result<f64> {
            Ok(self.bounds[features[0] as usize].0)
        }

        fn predict_high(&self, features: &[f64]) -> Result<f64> {
            Ok(self.bounds[features[0] as usize].1)
        }
    }

    fn make_row(index: usize, open: f64, high: f64, low: f64, close: f64, atr: f64) -> FeatureRow {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        FeatureRow {
            date: base + Duration::days(index as i64),
            open,
            high,
            low,
            close,
            daily_return: index as f64,
            sma_10: 0.0,
            sma_50: 0.0,
            sma_signal: 0.0,
            rsi_14: 50.0,
            macd: 0.0,
            macd_signal: 0.0,
            macd_hist: 0.0,
            atr_14: atr,
        }
    }

    fn params(threshold: f64, multiplier: f64) -> BacktestParams {
        BacktestParams {
            entry_threshold_percent: threshold,
            sl_atr_multiplier: multiplier,
        }
    }

    #[test]
    fn no_entry_below_threshold() {
        let rows = vec![
            make_row(0, 100.0, 101.0, 99.0, 100.0, 1.0),
            make_row(1, 100.0, 101.0, 99.0, 100.0, 1.0),
            make_row(2, 100.0, 101.0, 99.0, 100.0, 1.0),
        ];
        // 2% spread stays under the 5% gate.
        let predictor = ScriptedBounds {
            bounds: vec![(100.0, 102.0); 3],
        };
        let run = run_simulation(&rows, &predictor, params(5.0, 1.0)).unwrap();
        assert_eq!(run.closed_trades, 0);
        assert_eq!(run.final_capital, INITIAL_CAPITAL);
        assert!(run.history.iter().all(|p| p.balance == INITIAL_CAPITAL));
    }

    #[test]
    fn take_profit_exit_compounds_capital() {
        let rows = vec![
            make_row(0, 100.0, 101.0, 99.5, 100.0, 1.0),
            make_row(1, 100.0, 100.5, 99.5, 100.0, 1.0),
            make_row(2, 100.0, 111.0, 100.5, 110.0, 1.0),
        ];
        let predictor = ScriptedBounds {
            bounds: vec![(100.0, 110.0), (1.0, 1.0), (1.0, 1.0)],
        };
        let run = run_simulation(&rows, &predictor, params(5.0, 1.0)).unwrap();
        assert_eq!(run.closed_trades, 1);
        assert!((run.final_capital - 110.0).abs() < 1e-9);
    }

    #[test]
    fn stop_loss_wins_when_both_levels_hit() {
        // Next bar trades through both the stop (99) and the target (110);
        // the stop must be applied.
        let rows = vec![
            make_row(0, 100.0, 101.0, 99.5, 100.0, 1.0),
            make_row(1, 100.0, 100.5, 99.5, 100.0, 1.0),
            make_row(2, 100.0, 120.0, 98.0, 100.0, 1.0),
        ];
        let predictor = ScriptedBounds {
            bounds: vec![(100.0, 110.0), (1.0, 1.0), (1.0, 1.0)],
        };
        let run = run_simulation(&rows, &predictor, params(5.0, 1.0)).unwrap();
        assert_eq!(run.closed_trades, 1);
        assert!((run.final_capital - 99.0).abs() < 1e-9);
    }

    #[test]
    fn reentry_after_exit_compounds_twice() {
        let rows = vec![
            make_row(0, 100.0, 101.0, 99.5, 100.0, 1.0),
            make_row(1, 100.0, 100.5, 99.5, 100.0, 1.0),
            make_row(2, 100.0, 111.0, 100.5, 100.0, 1.0),
            make_row(3, 100.0, 111.0, 100.5, 100.0, 1.0),
        ];
        let predictor = ScriptedBounds {
            bounds: vec![(100.0, 110.0), (100.0, 110.0), (1.0, 1.0), (1.0, 1.0)],
        };
        let run = run_simulation(&rows, &predictor, params(5.0, 1.0)).unwrap();
        assert_eq!(run.closed_trades, 2);
        assert!((run.final_capital - 121.0).abs() < 1e-9);
    }

    #[test]
    fn history_covers_every_processed_bar() {
        let rows = vec![
            make_row(0, 100.0, 101.0, 99.0, 100.0, 1.0),
            make_row(1, 100.0, 101.0, 99.0, 100.0, 1.0),
            make_row(2, 100.0, 101.0, 99.0, 100.0, 1.0),
            make_row(3, 100.0, 101.0, 99.0, 100.0, 1.0),
        ];
        let predictor = ScriptedBounds {
            bounds: vec![(1.0, 1.0); 4],
        };
        let run = run_simulation(&rows, &predictor, params(5.0, 1.0)).unwrap();
        assert_eq!(run.history.len(), rows.len() - 1);
        for (i, point) in run.history.iter().enumerate() {
            assert_eq!(point.date, rows[i].date.date_naive());
        }
    }

    #[test]
    fn negative_predicted_low_never_enters() {
        let rows = vec![
            make_row(0, 100.0, 101.0, 99.0, 100.0, 1.0),
            make_row(1, 100.0, 500.0, 0.5, 100.0, 1.0),
            make_row(2, 100.0, 500.0, 0.5, 100.0, 1.0),
        ];
        let predictor = ScriptedBounds {
            bounds: vec![(-5.0, 110.0); 3],
        };
        let run = run_simulation(&rows, &predictor, params(5.0, 1.0)).unwrap();
        assert_eq!(run.closed_trades, 0);
        assert_eq!(run.final_capital, INITIAL_CAPITAL);
    }

    #[test]
    fn grid_search_selects_highest_final_capital() {
        // 4.1% spread: only the 3% threshold ever trades.
        let rows = vec![
            make_row(0, 100.0, 101.0, 99.5, 100.0, 1.0),
            make_row(1, 100.0, 100.5, 99.8, 100.0, 1.0),
            make_row(2, 100.0, 105.0, 100.2, 104.0, 1.0),
        ];
        let predictor = ScriptedBounds {
            bounds: vec![(100.0, 104.1), (1.0, 1.0), (1.0, 1.0)],
        };
        let best = run_grid_search(&rows, &predictor, &[3.0, 5.0], &[1.0]).unwrap();
        assert_eq!(best.params.entry_threshold_percent, 3.0);
        assert!((best.final_capital - 104.1).abs() < 1e-9);
    }

    #[test]
    fn summary_reports_drawdown_and_return() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let history: Vec<BalancePoint> = [100.0, 110.0, 99.0, 120.0]
            .iter()
            .enumerate()
            .map(|(i, balance)| BalancePoint {
                date: (base + Duration::days(i as i64)).date_naive(),
                balance: *balance,
            })
            .collect();
        let run = BacktestRun {
            params: params(5.0, 1.0),
            final_capital: 120.0,
            closed_trades: 2,
            history,
        };
        let summary = summarize(&run);
        assert!((summary.total_return_percent - 20.0).abs() < 1e-9);
        assert!((summary.max_drawdown_percent - 10.0).abs() < 1e-9);
    }
}
