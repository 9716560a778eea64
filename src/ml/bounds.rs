use crate::ml::scaler::StandardScaler;
use crate::ml::{flatten_rows, train_test_split_index};
use anyhow::{anyhow, Result};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

type ForestRegressor = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Predicts the next bar's price bounds from a feature row. The
/// backtester only depends on this seam so tests can substitute a
/// deterministic predictor.
pub trait BoundPredictor {
    fn predict_low(&self, features: &[f64]) -> Result<f64>;
    fn predict_high(&self, features: &[f64]) -> Result<f64>;
}

struct FittedRegressor {
    model: ForestRegressor,
    scaler: StandardScaler,
}

impl FittedRegressor {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        let scaled = self.scaler.transform_row(features)?;
        let matrix = DenseMatrix::new(1, scaled.len(), scaled, false);
        let predictions = self
            .model
            .predict(&matrix)
            .map_err(|err| anyhow!("Bound prediction failed: {}", err))?;
        predictions
            .first()
            .copied()
            .ok_or_else(|| anyhow!("Bound model returned no prediction"))
    }
}

/// The low/high regressor pair for one asset, each with its own scaler so
/// the four artifacts stay independently replaceable in the store.
pub struct BoundModel {
    low: FittedRegressor,
    high: FittedRegressor,
}

pub struct BoundTrainReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub low_test_mae: f64,
    pub high_test_mae: f64,
}

/// All four serialized artifacts of a `BoundModel`, in store order.
pub struct BoundArtifacts {
    pub low_model: Vec<u8>,
    pub low_scaler: Vec<u8>,
    pub high_model: Vec<u8>,
    pub high_scaler: Vec<u8>,
}

fn train_regressor(features: &[Vec<f64>], targets: &[f64]) -> Result<(FittedRegressor, f64)> {
    let split = train_test_split_index(features.len())?;
    let (train_x, test_x) = features.split_at(split);
    let (train_y, test_y) = targets.split_at(split);

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
    let params = RandomForestRegressorParameters::default()
        .with_n_trees(100)
        .with_seed(42);
    let model = RandomForestRegressor::fit(&train_matrix, &train_y.to_vec(), params)
        .map_err(|err| anyhow!("Bound model training failed: {}", err))?;

    let test_matrix = DenseMatrix::new(test_scaled.len(), columns, flatten_rows(&test_scaled), false);
    let predictions = model
        .predict(&test_matrix)
        .map_err(|err| anyhow!("Bound model evaluation failed: {}", err))?;
    let mae = if test_y.is_empty() {
        0.0
    } else {
        predictions
            .iter()
            .zip(test_y.iter())
            .map(|(predicted, actual)| (predicted - actual).abs())
            .sum::<f64>()
            / test_y.len() as f64
    };

    Ok((FittedRegressor { model, scaler }, mae))
}

impl BoundModel {
    /// Trains both regressors on a chronological 80/20 split.
    pub fn train(
        features: &[Vec<f64>],
        lows: &[f64],
        highs: &[f64],
    ) -> Result<(Self, BoundTrainReport)> {
        if features.len() != lows.len() || features.len() != highs.len() {
            return Err(anyhow!(
                "Feature/target length mismatch: {} features, {} lows, {} highs",
                features.len(),
                lows.len(),
                highs.len()
            ));
        }

        let split = train_test_split_index(features.len())?;
        let (low, low_test_mae) = train_regressor(features, lows)?;
        let (high, high_test_mae) = train_regressor(features, highs)?;

        let report = BoundTrainReport {
            train_rows: split,
            test_rows: features.len() - split,
            low_test_mae,
            high_test_mae,
        };
        Ok((Self { low, high }, report))
    }

    pub fn to_artifacts(&self) -> Result<BoundArtifacts> {
        Ok(BoundArtifacts {
            low_model: bincode::serialize(&self.low.model)?,
            low_scaler: bincode::serialize(&self.low.scaler)?,
            high_model: bincode::serialize(&self.high.model)?,
            high_scaler: bincode::serialize(&self.high.scaler)?,
        })
    }

    pub fn from_artifacts(artifacts: &BoundArtifacts) -> Result<Self> {
        Ok(Self {
            low: FittedRegressor {
                model: bincode::deserialize(&artifacts.low_model)?,
                scaler: bincode::deserialize(&artifacts.low_scaler)?,
            },
            high: FittedRegressor {
                model: bincode::deserialize(&artifacts.high_model)?,
                scaler: bincode::deserialize(&artifacts.high_scaler)?,
            },
        })
    }
}

impl BoundPredictor for BoundModel {
    fn predict_low(&self, features: &[f64]) -> Result<f64> {
        self.low.predict(features)
    }

    fn predict_high(&self, features: &[f64]) -> Result<f64> {
        self.high.predict(features)
    }
}
