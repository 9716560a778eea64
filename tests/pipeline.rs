use chrono::{Duration, TimeZone, Utc};
use pulse::backtester::{
    run_grid_search, summarize, DEFAULT_ENTRY_THRESHOLDS, DEFAULT_SL_MULTIPLIERS, INITIAL_CAPITAL,
};
use pulse::features::compute_features;
use pulse::ml::{
    build_bounds_dataset, build_direction_dataset, BoundModel, DirectionModel,
};
use pulse::models::Candle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded random-walk bars so every run sees the same market.
fn random_walk_candles(count: usize, seed: u64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
    let mut close = 100.0f64;

    (0..count)
        .map(|i| {
            let open = close;
            let drift: f64 = rng.gen_range(-1.5..1.6);
            close = (close + drift).max(5.0);
            let high = open.max(close) + rng.gen_range(0.0..1.0);
            let low = (open.min(close) - rng.gen_range(0.0..1.0)).max(1.0);
            Candle {
                date: base + Duration::days(i as i64),
                open,
                high,
                low,
                close,
                adj_close: Some(close),
                volume: rng.gen_range(500..5_000),
            }
        })
        .collect()
}

#[test]
fn features_feed_both_training_paths() {
    let candles = random_walk_candles(320, 7);
    let rows = compute_features(&candles).expect("feature computation");

    let (features, labels) = build_direction_dataset(&rows);
    assert_eq!(features.len(), rows.len() - 1);
    let (_, report) = DirectionModel::train(&features, &labels).expect("direction training");
    assert!(report.test_rows > 0);
    assert!((0.0..=1.0).contains(&report.test_accuracy));

    let (features, lows, highs) = build_bounds_dataset(&rows);
    let (_, report) = BoundModel::train(&features, &lows, &highs).expect("bound training");
    assert!(report.low_test_mae.is_finite());
    assert!(report.high_test_mae.is_finite());
}

#[test]
fn grid_search_runs_end_to_end_on_trained_bounds() {
    let candles = random_walk_candles(320, 11);
    let rows = compute_features(&candles).expect("feature computation");
    let (features, lows, highs) = build_bounds_dataset(&rows);
    let (bounds, _) = BoundModel::train(&features, &lows, &highs).expect("bound training");

    let best = run_grid_search(
        &rows,
        &bounds,
        &DEFAULT_ENTRY_THRESHOLDS,
        &DEFAULT_SL_MULTIPLIERS,
    )
    .expect("grid search");

    assert!(best.final_capital.is_finite());
    assert!(best.final_capital > 0.0);
    assert_eq!(best.history.len(), rows.len() - 1);
    assert!(DEFAULT_ENTRY_THRESHOLDS.contains(&best.params.entry_threshold_percent));
    assert!(DEFAULT_SL_MULTIPLIERS.contains(&best.params.sl_atr_multiplier));

    let summary = summarize(&best);
    let expected_return = (best.final_capital / INITIAL_CAPITAL - 1.0) * 100.0;
    assert!((summary.total_return_percent - expected_return).abs() < 1e-9);
    assert!(summary.max_drawdown_percent >= 0.0);
}

#[test]
fn restored_artifacts_reproduce_the_grid_winner() {
    let candles = random_walk_candles(300, 23);
    let rows = compute_features(&candles).expect("feature computation");
    let (features, lows, highs) = build_bounds_dataset(&rows);
    let (bounds, _) = BoundModel::train(&features, &lows, &highs).expect("bound training");

    let artifacts = bounds.to_artifacts().expect("artifact serialization");
    let restored = BoundModel::from_artifacts(&artifacts).expect("artifact restore");

    let thresholds = [3.0, 5.0];
    let multipliers = [1.0, 2.0];
    let original = run_grid_search(&rows, &bounds, &thresholds, &multipliers).expect("grid");
    let replayed = run_grid_search(&rows, &restored, &thresholds, &multipliers).expect("grid");

    assert_eq!(original.params, replayed.params);
    assert_eq!(original.closed_trades, replayed.closed_trades);
    assert!((original.final_capital - replayed.final_capital).abs() < 1e-9);
    assert_eq!(original.history, replayed.history);
}
