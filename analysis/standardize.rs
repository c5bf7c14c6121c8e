use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONSTANT_COLUMN_TOLERANCE: f64 = 10.0 * f64::EPSILON;

#[derive(Error, Debug)]
pub enum StandardizerError {
    #[error("The standardizer must be fit before it can transform data.")]
    NotFitted,
    #[error("Cannot fit a standardizer on an empty feature matrix.")]
    EmptyInput,
    #[error("Standardizer was fit on {expected} features, but the input has {found}.")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("Standardizer parameters are inconsistent: {means} means but {scales} scales.")]
    InconsistentParams { means: usize, scales: usize },
}

/// Per-feature centering and scaling learned from the training partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizerParams {
    pub means: Vec<f64>,
    /// Population standard deviation of each feature. Zero marks a constant column.
    pub scales: Vec<f64>,
}

/// Z-score transform `(x - mean) / scale`. Zero-scale columns map to exactly 0.
#[derive(Debug, Clone, Default)]
pub struct Standardizer {
    params: Option<StandardizerParams>,
}

impl Standardizer {
    pub fn new() -> Self {
        Self { params: None }
    }

    /// Rebuilds a fitted standardizer from persisted parameters.
    pub fn from_params(params: StandardizerParams) -> Result<Self, StandardizerError> {
        if params.means.len() != params.scales.len() {
            return Err(StandardizerError::InconsistentParams {
                means: params.means.len(),
                scales: params.scales.len(),
            });
        }
        Ok(Self {
            params: Some(params),
        })
    }

    pub fn params(&self) -> Option<&StandardizerParams> {
        self.params.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    /// Learns means and scales from `x`, replacing any earlier fit.
    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<&StandardizerParams, StandardizerError> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(StandardizerError::EmptyInput);
        }
        let means = x
            .mean_axis(Axis(0))
            .ok_or(StandardizerError::EmptyInput)?;
        let mut scales = x.std_axis(Axis(0), 0.0);

        // Rounding in the mean leaves constant columns with a tiny nonzero spread.
        for (j, scale) in scales.iter_mut().enumerate() {
            if *scale <= CONSTANT_COLUMN_TOLERANCE * means[j].abs().max(1.0) {
                log::warn!("Feature column {j} is constant in the training data; it will standardize to 0.");
                *scale = 0.0;
            }
        }

        Ok(self.params.insert(StandardizerParams {
            means: means.to_vec(),
            scales: scales.to_vec(),
        }))
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, StandardizerError> {
        let params = self.params.as_ref().ok_or(StandardizerError::NotFitted)?;
        if x.ncols() != params.means.len() {
            return Err(StandardizerError::ShapeMismatch {
                expected: params.means.len(),
                found: x.ncols(),
            });
        }

        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let mean = params.means[j];
            let scale = params.scales[j];
            if scale == 0.0 {
                column.fill(0.0);
            } else {
                column.mapv_inplace(|v| (v - mean) / scale);
            }
        }
        Ok(out)
    }

    /// Transforms a single record laid out in the fitted feature order.
    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>, StandardizerError> {
        let as_matrix = row.insert_axis(Axis(0));
        let transformed = self.transform(as_matrix)?;
        Ok(transformed.row(0).to_owned())
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>, StandardizerError> {
        self.fit(x)?;
        self.transform(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_transform_before_fit_is_a_state_error() {
        let scaler = Standardizer::new();
        let x = array![[1.0, 2.0]];
        assert!(matches!(
            scaler.transform(x.view()),
            Err(StandardizerError::NotFitted)
        ));
    }

    #[test]
    fn test_fit_transform_yields_zero_mean_unit_std() {
        let mut rng = StdRng::seed_from_u64(7);
        let x = Array2::from_shape_fn((200, 3), |(_, j)| {
            (j as f64 + 1.0) * 10.0 + rng.gen_range(-5.0..5.0) * (j as f64 + 1.0)
        });

        let mut scaler = Standardizer::new();
        let z = scaler.fit_transform(x.view()).unwrap();
        for column in z.axis_iter(Axis(1)) {
            assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-10);
            assert_abs_diff_eq!(column.std(0.0), 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_constant_column_standardizes_to_zero() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let mut scaler = Standardizer::new();
        let z = scaler.fit_transform(x.view()).unwrap();
        assert!(z.column(1).iter().all(|&v| v == 0.0));
        assert!(z.iter().all(|v| v.is_finite()));

        // A later record with a different value on the constant column still maps to 0.
        let row = scaler.transform_row(array![2.0, 9.0].view()).unwrap();
        assert_abs_diff_eq!(row[0], 0.0, epsilon = 1e-12);
        assert_eq!(row[1], 0.0);
    }

    #[test]
    fn test_params_come_from_fit_data_only() {
        let train = array![[0.0], [2.0]];
        let test = array![[4.0]];
        let mut scaler = Standardizer::new();
        let params = scaler.fit(train.view()).unwrap().clone();
        assert_eq!(params.means, vec![1.0]);
        assert_eq!(params.scales, vec![1.0]);

        let z = scaler.transform(test.view()).unwrap();
        assert_abs_diff_eq!(z[[0, 0]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let mut scaler = Standardizer::new();
        scaler.fit(array![[1.0, 2.0], [3.0, 4.0]].view()).unwrap();
        match scaler.transform(array![[1.0, 2.0, 3.0]].view()) {
            Err(StandardizerError::ShapeMismatch { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_from_params_round_trips_transform() {
        let x = array![[1.0, 10.0], [3.0, 30.0], [5.0, 20.0]];
        let mut fitted = Standardizer::new();
        let expected = fitted.fit_transform(x.view()).unwrap();

        let restored = Standardizer::from_params(fitted.params().unwrap().clone()).unwrap();
        assert_eq!(restored.transform(x.view()).unwrap(), expected);
    }
}
