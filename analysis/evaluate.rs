use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EvaluationError {
    #[error("Cannot evaluate: true targets have {y_true} entries but predictions have {y_pred}.")]
    LengthMismatch { y_true: usize, y_pred: usize },
    #[error("Cannot evaluate an empty set of predictions; R² is undefined.")]
    EmptyInput,
}

/// Error and fit metrics for one model on one evaluation split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
}

fn check_inputs(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<(), EvaluationError> {
    if y_true.len() != y_pred.len() {
        return Err(EvaluationError::LengthMismatch {
            y_true: y_true.len(),
            y_pred: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(EvaluationError::EmptyInput);
    }
    Ok(())
}

/// Mean squared error alone; the cross-validation score.
pub fn mean_squared_error(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
) -> Result<f64, EvaluationError> {
    check_inputs(y_true, y_pred)?;
    let sum: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    Ok(sum / y_true.len() as f64)
}

/// Computes MAE, MSE, RMSE and R².
///
/// R² uses the mean of `y_true` from this call. When `y_true` has no variance,
/// R² is 1 for an exact fit and 0 otherwise.
pub fn evaluate(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
) -> Result<RegressionMetrics, EvaluationError> {
    check_inputs(y_true, y_pred)?;
    let n = y_true.len() as f64;

    let mut abs_sum = 0.0;
    let mut ss_res = 0.0;
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let diff = t - p;
        abs_sum += diff.abs();
        ss_res += diff * diff;
    }

    let mean = y_true.sum() / n;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();

    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };

    let mse = ss_res / n;
    Ok(RegressionMetrics {
        mae: abs_sum / n,
        mse,
        rmse: mse.sqrt(),
        r2,
    })
}
