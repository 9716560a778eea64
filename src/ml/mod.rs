use crate::features::FeatureRow;
use crate::models::Asset;
use anyhow::{anyhow, Result};

pub mod bounds;
pub mod direction;
pub mod scaler;

pub use bounds::{BoundArtifacts, BoundModel, BoundPredictor, BoundTrainReport};
pub use direction::{DirectionModel, DirectionTrainReport};
pub use scaler::StandardScaler;

const TRAIN_FRACTION: f64 = 0.8;

/// Store names of the six artifacts kept per asset.
pub fn direction_model_name(asset: Asset) -> String {
    format!("{}_model", asset.model_prefix())
}

pub fn direction_scaler_name(asset: Asset) -> String {
    format!("{}_scaler", asset.model_prefix())
}

pub fn low_model_name(asset: Asset) -> String {
    format!("{}_low_model", asset.model_prefix())
}

pub fn low_scaler_name(asset: Asset) -> String {
    format!("{}_low_scaler", asset.model_prefix())
}

pub fn high_model_name(asset: Asset) -> String {
    format!("{}_high_model", asset.model_prefix())
}

pub fn high_scaler_name(asset: Asset) -> String {
    format!("{}_high_scaler", asset.model_prefix())
}

/// Chronological split point; errors out when either side would be empty.
pub(crate) fn train_test_split_index(rows: usize) -> Result<usize> {
    let split = (rows as f64 * TRAIN_FRACTION) as usize;
    if split == 0 || split >= rows {
        return Err(anyhow!(
            "Dataset too small for a train/test split: {} rows",
            rows
        ));
    }
    Ok(split)
}

pub(crate) fn flatten_rows(rows: &[Vec<f64>]) -> Vec<f64> {
    rows.iter().flatten().copied().collect()
}

/// Direction dataset: the feature vector of bar `i` labeled 1 when the
/// close of bar `i + 1` is above the close of bar `i`.
pub fn build_direction_dataset(rows: &[FeatureRow]) -> (Vec<Vec<f64>>, Vec<u32>) {
    let mut features = Vec::with_capacity(rows.len().saturating_sub(1));
    let mut labels = Vec::with_capacity(rows.len().saturating_sub(1));
    for window in rows.windows(2) {
        features.push(window[0].model_features());
        labels.push(u32::from(window[1].close > window[0].close));
    }
    (features, labels)
}

/// Bound dataset: the feature vector of bar `i` targeting the low and
/// high of bar `i + 1`.
pub fn build_bounds_dataset(rows: &[FeatureRow]) -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
    let mut features = Vec::with_capacity(rows.len().saturating_sub(1));
    let mut lows = Vec::with_capacity(rows.len().saturating_sub(1));
    let mut highs = Vec::with_capacity(rows.len().saturating_sub(1));
    for window in rows.windows(2) {
        features.push(window[0].model_features());
        lows.push(window[1].low);
        highs.push(window[1].high);
    }
    (features, lows, highs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::synthetic_candles;
    use crate::features::{compute_features, MODEL_FEATURES};

    #[test]
    fn direction_labels_follow_next_close() {
        let candles = synthetic_candles(80);
        let rows = compute_features(&candles).unwrap();
        let (features, labels) = build_direction_dataset(&rows);
        assert_eq!(features.len(), rows.len() - 1);
        assert_eq!(labels.len(), rows.len() - 1);
        for (i, label) in labels.iter().enumerate() {
            let expected = u32::from(rows[i + 1].close > rows[i].close);
            assert_eq!(*label, expected);
        }
        assert_eq!(features[0].len(), MODEL_FEATURES.len());
    }

    #[test]
    fn bound_targets_are_next_bar_extremes() {
        let candles = synthetic_candles(80);
        let rows = compute_features(&candles).unwrap();
        let (features, lows, highs) = build_bounds_dataset(&rows);
        assert_eq!(features.len(), rows.len() - 1);
        assert_eq!(lows[0], rows[1].low);
        assert_eq!(highs[0], rows[1].high);
    }

    #[test]
    fn split_index_requires_both_sides() {
        assert!(train_test_split_index(1).is_err());
        assert_eq!(train_test_split_index(10).unwrap(), 8);
    }
}
