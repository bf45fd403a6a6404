//! Logistic regression over z-scored features.
//!
//! Batch gradient descent from a zero init, so retraining on the same
//! buffer always produces the same weights. Column statistics are
//! captured at fit time and applied to every later prediction.

use serde::{Deserialize, Serialize};

use super::Classifier;
use crate::types::{EngineError, FEATURE_COUNT};

const EPOCHS: usize = 200;
const LEARNING_RATE: f64 = 0.1;
/// Columns with variance below this are treated as constant and left
/// unscaled.
const STD_FLOOR: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    weights: Vec<f64>,
    bias: f64,
    feature_mean: Vec<f64>,
    feature_std: Vec<f64>,
    trained: bool,
}

impl Default for LogisticModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticModel {
    pub fn new() -> Self {
        Self {
            weights: vec![0.0; FEATURE_COUNT],
            bias: 0.0,
            feature_mean: vec![0.0; FEATURE_COUNT],
            feature_std: vec![1.0; FEATURE_COUNT],
            trained: false,
        }
    }

    fn standardize(&self, row: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = (row[i] - self.feature_mean[i]) / self.feature_std[i];
        }
        out
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.weights.len() != FEATURE_COUNT
            || self.feature_mean.len() != FEATURE_COUNT
            || self.feature_std.len() != FEATURE_COUNT
        {
            return Err(EngineError::Model(format!(
                "state dimensions do not match {FEATURE_COUNT} features"
            )));
        }
        if self.feature_std.iter().any(|s| *s <= 0.0) {
            return Err(EngineError::Model(
                "state has non-positive feature scale".to_string(),
            ));
        }
        Ok(())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LogisticModel {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn fit(&mut self, rows: &[[f64; FEATURE_COUNT]], labels: &[bool]) -> Result<(), EngineError> {
        if rows.len() != labels.len() {
            return Err(EngineError::Model(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if rows.is_empty() {
            return Err(EngineError::Model("cannot fit on an empty batch".to_string()));
        }
        let n = rows.len() as f64;

        let mut mean = vec![0.0; FEATURE_COUNT];
        for row in rows {
            for i in 0..FEATURE_COUNT {
                mean[i] += row[i];
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut std = vec![0.0; FEATURE_COUNT];
        for row in rows {
            for i in 0..FEATURE_COUNT {
                let d = row[i] - mean[i];
                std[i] += d * d;
            }
        }
        for s in &mut std {
            *s = (*s / n).sqrt();
            if *s < STD_FLOOR {
                *s = 1.0;
            }
        }

        self.feature_mean = mean;
        self.feature_std = std;
        let standardized: Vec<[f64; FEATURE_COUNT]> =
            rows.iter().map(|r| self.standardize(r)).collect();

        let mut weights = vec![0.0; FEATURE_COUNT];
        let mut bias = 0.0;

        for _ in 0..EPOCHS {
            let mut grad_w = vec![0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;

            for (row, &label) in standardized.iter().zip(labels) {
                let z: f64 = bias + row.iter().zip(&weights).map(|(x, w)| x * w).sum::<f64>();
                let y = if label { 1.0 } else { 0.0 };
                let err = sigmoid(z) - y;

                grad_b += err;
                for i in 0..FEATURE_COUNT {
                    grad_w[i] += err * row[i];
                }
            }

            bias -= LEARNING_RATE * grad_b / n;
            for i in 0..FEATURE_COUNT {
                weights[i] -= LEARNING_RATE * grad_w[i] / n;
            }
        }

        self.weights = weights;
        self.bias = bias;
        self.trained = true;
        Ok(())
    }

    fn predict_probability(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        if !self.trained {
            return 0.5;
        }
        let row = self.standardize(row);
        let z: f64 = self.bias
            + row
                .iter()
                .zip(&self.weights)
                .map(|(x, w)| x * w)
                .sum::<f64>();
        sigmoid(z)
    }

    fn export_state(&self) -> Result<serde_json::Value, EngineError> {
        serde_json::to_value(self).map_err(|e| EngineError::Model(e.to_string()))
    }

    fn import_state(&mut self, state: serde_json::Value) -> Result<(), EngineError> {
        let model: LogisticModel =
            serde_json::from_value(state).map_err(|e| EngineError::Model(e.to_string()))?;
        model.validate()?;
        *self = model;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
