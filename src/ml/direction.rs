use crate::ml::scaler::StandardScaler;
use crate::ml::{flatten_rows, train_test_split_index};
use crate::models::SignalAction;
use anyhow::{anyhow, Result};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

type ForestClassifier = RandomForestClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// Direction classifier with its fitted scaler. Label 1 means the next
/// close is expected above the current close.
pub struct DirectionModel {
    model: ForestClassifier,
    scaler: StandardScaler,
}

pub struct DirectionTrainReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub test_accuracy: f64,
}

impl DirectionModel {
    /// Trains on a chronological 80/20 split and reports hold-out accuracy.
    pub fn train(features: &[Vec<f64>], labels: &[u32]) -> Result<(Self, DirectionTrainReport)> {
        if features.len() != labels.len() {
            return Err(anyhow!(
                "Feature/label length mismatch: {} vs {}",
                features.len(),
                labels.len()
            ));
        }
        let split = train_test_split_index(features.len())?;

        let (train_x, test_x) = features.split_at(split);
        let (train_y, test_y) = labels.split_at(split);

        let scaler = StandardScaler::fit(train_x)?;
        let train_scaled = scaler.transform(train_x)?;
        let test_scaled = scaler.transform(test_x)?;

        let columns = scaler.n_features();
        let train_matrix = DenseMatrix::new(
            train_scaled.len(),
            columns,
            flatten_rows(&train_scaled),
            false,
        );
        let params = RandomForestClassifierParameters::default()
            .with_n_trees(100)
            .with_seed(42);
        let model = RandomForestClassifier::fit(&train_matrix, &train_y.to_vec(), params)
            .map_err(|err| anyhow!("Direction model training failed: {}", err))?;

        let test_matrix =
            DenseMatrix::new(test_scaled.len(), columns, flatten_rows(&test_scaled), false);
        let predictions = model
            .predict(&test_matrix)
            .map_err(|err| anyhow!("Direction model evaluation failed: {}", err))?;
        let correct = predictions
            .iter()
            .zip(test_y.iter())
            .filter(|(predicted, actual)| predicted == actual)
            .count();
        let test_accuracy = if test_y.is_empty() {
            0.0
        } else {
            correct as f64 / test_y.len() as f64
        };

        let report = DirectionTrainReport {
            train_rows: train_x.len(),
            test_rows: test_x.len(),
            test_accuracy,
        };
        Ok((Self { model, scaler }, report))
    }

    pub fn predict(&self, features: &[f64]) -> Result<SignalAction> {
        let scaled = self.scaler.transform_row(features)?;
        let matrix = DenseMatrix::new(1, scaled.len(), scaled, false);
        let predictions = self
            .model
            .predict(&matrix)
            .map_err(|err| anyhow!("Direction prediction failed: {}", err))?;
        let label = predictions
            .first()
            .copied()
            .ok_or_else(|| anyhow!("Direction model returned no prediction"))?;
        // Label 1 = next close above current close, hence a buy.
        Ok(if label == 1 {
            SignalAction::Buy
        } else {
            SignalAction::Sell
        })
    }

    pub fn to_artifacts(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let model_bytes = bincode::serialize(&self.model)?;
        let scaler_bytes = bincode::serialize(&self.scaler)?;
        Ok((model_bytes, scaler_bytes))
    }

    pub fn from_artifacts(model_bytes: &[u8], scaler_bytes: &[u8]) -> Result<Self> {
        let model: ForestClassifier = bincode::deserialize(model_bytes)?;
        let scaler: StandardScaler = bincode::deserialize(scaler_bytes)?;
        Ok(Self { model, scaler })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A trivially separable dataset: label follows the sign of the first
    /// feature.
    fn separable_dataset(rows: usize) -> (Vec<Vec<f64>>, Vec<u32>) {
        let mut features = Vec::with_capacity(rows);
        let mut labels = Vec::with_capacity(rows);
        for i in 0..rows {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let jitter = (i as f64 * 0.37).sin() * 0.05;
            features.push(vec![x + jitter, i as f64 / rows as f64]);
            labels.push(if x > 0.0 { 1 } else { 0 });
        }
        (features, labels)
    }

    #[test]
    fn learns_a_separable_dataset() {
        let (features, labels) = separable_dataset(200);
        let (model, report) = DirectionModel::train(&features, &labels).unwrap();
        assert!(report.test_accuracy > 0.9, "accuracy {}", report.test_accuracy);
        assert_eq!(model.predict(&[1.0, 0.5]).unwrap(), SignalAction::Buy);
        assert_eq!(model.predict(&[-1.0, 0.5]).unwrap(), SignalAction::Sell);
    }

    #[test]
    fn artifact_round_trip_preserves_predictions() {
        let (features, labels) = separable_dataset(120);
        let (model, _) = DirectionModel::train(&features, &labels).unwrap();
        let (model_bytes, scaler_bytes) = model.to_artifacts().unwrap();
        let restored = DirectionModel::from_artifacts(&model_bytes, &scaler_bytes).unwrap();
        for probe in [[1.0, 0.1], [-1.0, 0.9], [0.8, 0.4]] {
            assert_eq!(
                model.predict(&probe).unwrap(),
                restored.predict(&probe).unwrap()
            );
        }
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let (features, mut labels) = separable_dataset(50);
        labels.pop();
        assert!(DirectionModel::train(&features, &labels).is_err());
    }
}
