use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Per-column standardization fitted on the training split only. Stored
/// alongside each model so inference sees the same transform as training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    std_devs: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(anyhow!("Cannot fit a scaler on an empty dataset"));
        };
        let columns = first.len();
        if columns == 0 {
            return Err(anyhow!("Cannot fit a scaler on zero-width rows"));
        }

        let count = rows.len() as f64;
        let mut means = vec![0.0; columns];
        for row in rows {
            if row.len() != columns {
                return Err(anyhow!(
                    "Inconsistent row width: expected {}, got {}",
                    columns,
                    row.len()
                ));
            }
            for (i, value) in row.iter().enumerate() {
                means[i] += value;
            }
        }
        for mean in &mut means {
            *mean /= count;
        }

        let mut variances = vec![0.0; columns];
        for row in rows {
            for (i, value) in row.iter().enumerate() {
                let diff = value - means[i];
                variances[i] += diff * diff;
            }
        }

        let std_devs = variances
            .into_iter()
            .map(|variance| {
                let std_dev = (variance / count).sqrt();
                // Constant columns scale to zero, not NaN.
                if std_dev > 0.0 {
                    std_dev
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self { means, std_devs })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.means.len() {
            return Err(anyhow!(
                "Scaler expects {} features, got {}",
                self.means.len(),
                row.len()
            ));
        }
        Ok(row
            .iter()
            .enumerate()
            .map(|(i, value)| (value - self.means[i]) / self.std_devs[i])
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}
