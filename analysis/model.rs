use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the serialized form of a fitted linear model, both in
// the training report and in the persisted artifact bundle.

/// The regression family a model was fitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    /// Ordinary least squares, no penalty.
    Ols,
    /// Squared L2 penalty on the coefficients.
    Ridge,
    /// L1 penalty on the coefficients, fitted by coordinate descent.
    Lasso,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFamily::Ols => "Linear Regression",
            ModelFamily::Ridge => "Ridge Regression",
            ModelFamily::Lasso => "Lasso Regression",
        };
        f.write_str(name)
    }
}

/// A fitted linear model: `y = intercept + x · coefficients`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub family: ModelFamily,
    /// Regularization strength the model was refit with. `None` for OLS.
    pub alpha: Option<f64>,
    pub intercept: f64,
    /// One coefficient per feature, in the canonical feature order.
    pub coefficients: Vec<f64>,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Prediction data has {found} feature columns, but the model was trained on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
}

impl LinearModel {
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    /// Predicts every row of `x`, whose columns must follow the training order.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.coefficients.len() {
            return Err(ModelError::MismatchedFeatureCount {
                found: x.ncols(),
                expected: self.coefficients.len(),
            });
        }
        let beta = ArrayView1::from(self.coefficients.as_slice());
        Ok(x.dot(&beta) + self.intercept)
    }

    pub fn predict_one(&self, row: ArrayView1<f64>) -> Result<f64, ModelError> {
        if row.len() != self.coefficients.len() {
            return Err(ModelError::MismatchedFeatureCount {
                found: row.len(),
                expected: self.coefficients.len(),
            });
        }
        let beta = ArrayView1::from(self.coefficients.as_slice());
        Ok(row.dot(&beta) + self.intercept)
    }

    /// Number of coefficients that are exactly zero. Lasso drives these out.
    pub fn zero_coefficients(&self) -> usize {
        self.coefficients.iter().filter(|&&c| c == 0.0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn toy_model() -> LinearModel {
        LinearModel {
            family: ModelFamily::Ridge,
            alpha: Some(0.5),
            intercept: 5.5,
            coefficients: vec![0.25, -1.0, 0.0],
        }
    }

    #[test]
    fn test_predict_matches_hand_computation() {
        let model = toy_model();
        let x = array![[0.0, 0.0, 3.0], [4.0, 1.0, -2.0]];
        let predictions = model.predict(x.view()).unwrap();
        assert_abs_diff_eq!(predictions[0], 5.5, epsilon = 1e-12);
        assert_abs_diff_eq!(predictions[1], 5.5 + 1.0 - 1.0, epsilon = 1e-12);

        let single = model.predict_one(x.row(1)).unwrap();
        assert_abs_diff_eq!(single, predictions[1], epsilon = 1e-12);
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let model = toy_model();
        let x = array![[1.0, 2.0]];
        match model.predict(x.view()) {
            Err(ModelError::MismatchedFeatureCount { found, expected }) => {
                assert_eq!(found, 2);
                assert_eq!(expected, 3);
            }
            other => panic!("Expected MismatchedFeatureCount, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_coefficients_and_display() {
        let model = toy_model();
        assert_eq!(model.zero_coefficients(), 1);
        assert_eq!(model.family.to_string(), "Ridge Regression");
        assert_eq!(ModelFamily::Ols.to_string(), "Linear Regression");
    }
}
