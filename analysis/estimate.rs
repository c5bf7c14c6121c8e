// analysis/estimate.rs

//! # Linear Model Estimation
//!
//! Fits the three regression families used by the training pipeline:
//!
//! 1.  **OLS:** least squares on centered data via an SVD solve, so that
//!     rank-deficient designs still return the minimum-norm solution.
//!
//! 2.  **Ridge:** closed form `(XᵀX + αI)β = Xᵀy` on centered data. The
//!     intercept is never penalized.
//!
//! 3.  **Lasso:** cyclic coordinate descent on
//!     `(1 / 2n)‖y − Xβ‖² + α‖β‖₁`, stopping once the duality gap drops below
//!     `tolerance · ‖y‖²`. Running out of iterations is reported on the fit and
//!     logged, never raised.
//!
//! Regularized families pick `α` by k-fold cross-validation over a log-spaced
//! grid, scored by mean squared error averaged across folds, and are then
//! refit once on all training rows at the winning `α`.

use crate::evaluate::{EvaluationError, mean_squared_error};
use crate::model::{LinearModel, ModelError, ModelFamily};
use crate::split::Fold;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::{LeastSquaresSvd, Solve};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LASSO_MAX_ITERATIONS: usize = 5000;
pub const DEFAULT_LASSO_TOLERANCE: f64 = 1e-4;

/// A comprehensive error type for the model estimation process.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("Feature matrix has {x_rows} rows but the target has {y_len} entries.")]
    ShapeMismatch { x_rows: usize, y_len: usize },

    #[error("Cannot fit a model without samples and features (got {rows} x {cols}).")]
    EmptyInput { rows: usize, cols: usize },

    #[error("Regularization strength must be finite and non-negative, but was {0}.")]
    InvalidAlpha(f64),

    #[error("The regularization grid is empty.")]
    EmptyGrid,

    #[error("Cross-validation needs at least one fold.")]
    NoFolds,

    #[error("A linear system solve failed. The design may be singular. Error: {0}")]
    LinearSystemSolveFailed(#[from] ndarray_linalg::error::LinalgError),

    #[error("Scoring a cross-validation fold failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Predicting a cross-validation fold failed: {0}")]
    Model(#[from] ModelError),
}

/// Stopping rule for the lasso coordinate descent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LassoSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for LassoSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_LASSO_MAX_ITERATIONS,
            tolerance: DEFAULT_LASSO_TOLERANCE,
        }
    }
}

/// The penalized families that take part in the grid search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Penalty {
    Ridge,
    Lasso(LassoSettings),
}

impl Penalty {
    pub fn family(&self) -> ModelFamily {
        match self {
            Penalty::Ridge => ModelFamily::Ridge,
            Penalty::Lasso(_) => ModelFamily::Lasso,
        }
    }
}

/// A fitted model together with solver diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    pub model: LinearModel,
    /// `false` when the lasso hit its iteration cap. Closed-form fits always converge.
    pub converged: bool,
    /// Coordinate-descent sweeps performed; 0 for closed-form solvers.
    pub iterations: usize,
}

/// Cross-validated score of one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaScore {
    pub alpha: f64,
    pub mean_mse: f64,
    pub fold_mse: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSearchResult {
    pub best_alpha: f64,
    pub best_mse: f64,
    /// One entry per grid point, in grid order.
    pub scores: Vec<AlphaScore>,
    /// Refit on every training row at `best_alpha`.
    pub fit: RegressionFit,
    /// Fold fits that stopped at the iteration cap.
    pub unconverged_fold_fits: usize,
}

/// `points` values spaced evenly in log10 between `10^min_exponent` and
/// `10^max_exponent`, both ends included.
pub fn log_spaced_grid(min_exponent: f64, max_exponent: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![10f64.powf(min_exponent)],
        _ => {
            let step = (max_exponent - min_exponent) / (points - 1) as f64;
            (0..points)
                .map(|i| {
                    let exponent = if i == points - 1 {
                        max_exponent
                    } else {
                        min_exponent + step * i as f64
                    };
                    10f64.powf(exponent)
                })
                .collect()
        }
    }
}

/// Unpenalized least squares with an intercept.
pub fn fit_ols(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<RegressionFit, EstimationError> {
    let centered = internal::center(x, y)?;
    let beta = centered.x.least_squares(&centered.y)?.solution;
    log::debug!("OLS coefficients: {beta:?}");
    Ok(centered.into_fit(ModelFamily::Ols, None, beta, true, 0))
}

/// Ridge regression at a fixed `alpha`.
pub fn fit_ridge(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alpha: f64,
) -> Result<RegressionFit, EstimationError> {
    internal::fit_penalized(x, y, Penalty::Ridge, alpha)
}

/// Lasso regression at a fixed `alpha`. Non-convergence is logged as a warning.
pub fn fit_lasso(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alpha: f64,
    settings: LassoSettings,
) -> Result<RegressionFit, EstimationError> {
    let fit = internal::fit_penalized(x, y, Penalty::Lasso(settings), alpha)?;
    if !fit.converged {
        log::warn!(
            "Lasso (alpha = {alpha:.6e}) did not converge within {} iterations; using best-effort coefficients.",
            settings.max_iterations
        );
    }
    Ok(fit)
}

/// Fits `penalty` at `alpha`, logging non-convergence like the public wrappers.
pub fn fit_with_penalty(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    penalty: Penalty,
    alpha: f64,
) -> Result<RegressionFit, EstimationError> {
    match penalty {
        Penalty::Ridge => fit_ridge(x, y, alpha),
        Penalty::Lasso(settings) => fit_lasso(x, y, alpha, settings),
    }
}

/// Scores every alpha by k-fold cross-validation, keeps the lowest mean MSE
/// (the earliest grid point wins ties) and refits on all rows.
///
/// Folds are evaluated in parallel, but scores are collected in grid and fold
/// order, so the result is identical to a sequential run.
pub fn grid_search(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    penalty: Penalty,
    alphas: &[f64],
    folds: &[Fold],
) -> Result<GridSearchResult, EstimationError> {
    if alphas.is_empty() {
        return Err(EstimationError::EmptyGrid);
    }
    if folds.is_empty() {
        return Err(EstimationError::NoFolds);
    }
    if x.nrows() != y.len() {
        return Err(EstimationError::ShapeMismatch {
            x_rows: x.nrows(),
            y_len: y.len(),
        });
    }

    log::info!(
        "Cross-validating {} over {} alphas x {} folds.",
        penalty.family(),
        alphas.len(),
        folds.len()
    );

    let fold_data: Vec<internal::FoldData> = folds
        .iter()
        .map(|fold| internal::FoldData::new(x, y, fold))
        .collect();

    let evaluated: Vec<(AlphaScore, usize)> = alphas
        .par_iter()
        .map(|&alpha| internal::score_alpha(&fold_data, penalty, alpha))
        .collect::<Result<_, _>>()?;

    let unconverged_fold_fits: usize = evaluated.iter().map(|(_, n)| n).sum();
    let scores: Vec<AlphaScore> = evaluated.into_iter().map(|(score, _)| score).collect();

    let mut best = 0;
    for (idx, score) in scores.iter().enumerate().skip(1) {
        if score.mean_mse < scores[best].mean_mse {
            best = idx;
        }
    }
    let best_alpha = scores[best].alpha;
    let best_mse = scores[best].mean_mse;

    if unconverged_fold_fits > 0 {
        log::warn!(
            "{unconverged_fold_fits} cross-validation fits of {} stopped at the iteration cap.",
            penalty.family()
        );
    }
    log::info!(
        "{}: best alpha = {best_alpha:.6e} (mean CV MSE {best_mse:.6}).",
        penalty.family()
    );

    let fit = fit_with_penalty(x, y, penalty, best_alpha)?;

    Ok(GridSearchResult {
        best_alpha,
        best_mse,
        scores,
        fit,
        unconverged_fold_fits,
    })
}

/// Internal module for estimation implementation details.
mod internal {
    use super::*;

    /// Training data shifted to zero column means, with the shifts kept so the
    /// intercept can be recovered.
    pub(super) struct Centered {
        pub x: Array2<f64>,
        pub y: Array1<f64>,
        pub x_mean: Array1<f64>,
        pub y_mean: f64,
    }

    impl Centered {
        pub(super) fn into_fit(
            self,
            family: ModelFamily,
            alpha: Option<f64>,
            beta: Array1<f64>,
            converged: bool,
            iterations: usize,
        ) -> RegressionFit {
            let intercept = self.y_mean - self.x_mean.dot(&beta);
            RegressionFit {
                model: LinearModel {
                    family,
                    alpha,
                    intercept,
                    coefficients: beta.to_vec(),
                },
                converged,
                iterations,
            }
        }
    }

    pub(super) fn center(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Centered, EstimationError> {
        if x.nrows() != y.len() {
            return Err(EstimationError::ShapeMismatch {
                x_rows: x.nrows(),
                y_len: y.len(),
            });
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(EstimationError::EmptyInput {
                rows: x.nrows(),
                cols: x.ncols(),
            });
        }
        let x_mean = x.mean_axis(Axis(0)).ok_or(EstimationError::EmptyInput {
            rows: x.nrows(),
            cols: x.ncols(),
        })?;
        let y_mean = y.sum() / y.len() as f64;
        Ok(Centered {
            x: &x - &x_mean,
            y: y.mapv(|v| v - y_mean),
            x_mean,
            y_mean,
        })
    }

    pub(super) fn fit_penalized(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        penalty: Penalty,
        alpha: f64,
    ) -> Result<RegressionFit, EstimationError> {
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(EstimationError::InvalidAlpha(alpha));
        }
        let centered = center(x, y)?;
        match penalty {
            Penalty::Ridge => {
                let beta = solve_ridge(&centered, alpha)?;
                Ok(centered.into_fit(ModelFamily::Ridge, Some(alpha), beta, true, 0))
            }
            Penalty::Lasso(settings) => {
                let outcome = coordinate_descent(&centered, alpha, settings);
                Ok(centered.into_fit(
                    ModelFamily::Lasso,
                    Some(alpha),
                    outcome.beta,
                    outcome.converged,
                    outcome.iterations,
                ))
            }
        }
    }

    fn solve_ridge(centered: &Centered, alpha: f64) -> Result<Array1<f64>, EstimationError> {
        let xt = centered.x.t();
        let mut gram = xt.dot(&centered.x);
        for j in 0..gram.nrows() {
            gram[[j, j]] += alpha;
        }
        let rhs = xt.dot(&centered.y);
        Ok(gram.solve(&rhs)?)
    }

    pub(super) struct DescentOutcome {
        pub beta: Array1<f64>,
        pub converged: bool,
        pub iterations: usize,
    }

    /// Cyclic coordinate descent with soft-thresholding, maintaining the
    /// residual `r = y − Xβ` incrementally.
    fn coordinate_descent(
        centered: &Centered,
        alpha: f64,
        settings: LassoSettings,
    ) -> DescentOutcome {
        let x = &centered.x;
        let y = &centered.y;
        let (n_samples, n_features) = x.dim();
        let mut beta = Array1::<f64>::zeros(n_features);

        let y_norm2 = y.dot(y);
        if y_norm2 == 0.0 {
            return DescentOutcome {
                beta,
                converged: true,
                iterations: 0,
            };
        }

        let alpha_scaled = alpha * n_samples as f64;
        let gap_tolerance = settings.tolerance * y_norm2;
        let col_norms_sq: Vec<f64> = x.axis_iter(Axis(1)).map(|c| c.dot(&c)).collect();
        let mut residual = y.clone();

        for iteration in 0..settings.max_iterations {
            let mut max_weight = 0.0f64;
            let mut max_change = 0.0f64;

            for j in 0..n_features {
                if col_norms_sq[j] == 0.0 {
                    continue;
                }
                let column = x.column(j);
                let old = beta[j];
                if old != 0.0 {
                    residual.scaled_add(old, &column);
                }

                let rho = column.dot(&residual);
                let updated = soft_threshold(rho, alpha_scaled) / col_norms_sq[j];
                if updated != 0.0 {
                    residual.scaled_add(-updated, &column);
                }
                beta[j] = updated;

                max_change = max_change.max((updated - old).abs());
                max_weight = max_weight.max(updated.abs());
            }

            let last = iteration + 1 == settings.max_iterations;
            if max_weight == 0.0 || max_change / max_weight < settings.tolerance || last {
                let gap = duality_gap(x, y, &beta, &residual, alpha_scaled);
                log::debug!("Lasso sweep {}: duality gap {gap:.3e}", iteration + 1);
                if gap < gap_tolerance {
                    return DescentOutcome {
                        beta,
                        converged: true,
                        iterations: iteration + 1,
                    };
                }
            }
        }

        DescentOutcome {
            beta,
            converged: false,
            iterations: settings.max_iterations,
        }
    }

    pub(super) fn soft_threshold(value: f64, threshold: f64) -> f64 {
        if value > threshold {
            value - threshold
        } else if value < -threshold {
            value + threshold
        } else {
            0.0
        }
    }

    /// Primal-dual gap of the lasso objective, scaled by `n`.
    fn duality_gap(
        x: &Array2<f64>,
        y: &Array1<f64>,
        beta: &Array1<f64>,
        residual: &Array1<f64>,
        alpha_scaled: f64,
    ) -> f64 {
        let xt_r = x.t().dot(residual);
        let dual_norm = xt_r.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let r_norm2 = residual.dot(residual);

        let (scale, mut gap) = if dual_norm > alpha_scaled {
            let scale = alpha_scaled / dual_norm;
            (scale, 0.5 * (r_norm2 + r_norm2 * scale * scale))
        } else {
            (1.0, r_norm2)
        };
        let l1_norm: f64 = beta.iter().map(|b| b.abs()).sum();
        gap += alpha_scaled * l1_norm - scale * residual.dot(y);
        gap
    }

    /// Row subsets for one fold, materialized once and shared across alphas.
    pub(super) struct FoldData {
        x_train: Array2<f64>,
        y_train: Array1<f64>,
        x_validation: Array2<f64>,
        y_validation: Array1<f64>,
    }

    impl FoldData {
        pub(super) fn new(x: ArrayView2<f64>, y: ArrayView1<f64>, fold: &Fold) -> Self {
            Self {
                x_train: x.select(Axis(0), &fold.train),
                y_train: y.select(Axis(0), &fold.train),
                x_validation: x.select(Axis(0), &fold.validation),
                y_validation: y.select(Axis(0), &fold.validation),
            }
        }
    }

    /// Mean validation MSE of `alpha` across folds, plus the number of fold
    /// fits that did not converge.
    pub(super) fn score_alpha(
        folds: &[FoldData],
        penalty: Penalty,
        alpha: f64,
    ) -> Result<(AlphaScore, usize), EstimationError> {
        let mut fold_mse = Vec::with_capacity(folds.len());
        let mut unconverged = 0;
        for fold in folds {
            let fit = fit_penalized(fold.x_train.view(), fold.y_train.view(), penalty, alpha)?;
            if !fit.converged {
                unconverged += 1;
            }
            let predicted = fit.model.predict(fold.x_validation.view())?;
            fold_mse.push(mean_squared_error(
                fold.y_validation.view(),
                predicted.view(),
            )?);
        }
        let mean_mse = fold_mse.iter().sum::<f64>() / fold_mse.len() as f64;
        log::debug!("{} alpha = {alpha:.6e}: mean CV MSE {mean_mse:.6}", penalty.family());
        Ok((
            AlphaScore {
                alpha,
                mean_mse,
                fold_mse,
            },
            unconverged,
        ))
    }
}
