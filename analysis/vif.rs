//! Variance inflation factors for the filtered table.
//!
//! Each column is regressed on all the others without an added intercept and
//! scored with the uncentered R², so `VIF = Σy² / SS_res`. Perfect collinearity
//! is reported as `f64::INFINITY`. The result is informational only and has no
//! effect on model fitting.

use crate::data::WineTable;
use ndarray::{Array1, ArrayView2, Axis};
use ndarray_linalg::LeastSquaresSvd;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Below this fraction of explained sum of squares the residual is treated as zero.
const COLLINEARITY_TOLERANCE: f64 = 1e-12;

#[derive(Error, Debug)]
pub enum VifError {
    #[error("Variance inflation factors need at least one row, but the table is empty.")]
    EmptyTable,
    #[error("Least-squares solve failed while computing the VIF of '{column}': {source}")]
    LeastSquaresFailed {
        column: String,
        source: ndarray_linalg::error::LinalgError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VifEntry {
    pub column: String,
    pub vif: f64,
}

impl VifEntry {
    pub fn is_infinite(&self) -> bool {
        self.vif.is_infinite()
    }
}

/// Computes the VIF of every column of `table`, in column order.
pub fn variance_inflation_factors(table: &WineTable) -> Result<Vec<VifEntry>, VifError> {
    if table.is_empty() {
        return Err(VifError::EmptyTable);
    }
    let values = table.values();
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let vif = column_vif(values, idx).map_err(|source| VifError::LeastSquaresFailed {
                column: name.clone(),
                source,
            })?;
            log::debug!("VIF({name}) = {vif:.4}");
            Ok(VifEntry {
                column: name.clone(),
                vif,
            })
        })
        .collect()
}

/// VIF of column `target` against every other column of `x`.
pub fn column_vif(
    x: ArrayView2<f64>,
    target: usize,
) -> Result<f64, ndarray_linalg::error::LinalgError> {
    let y: Array1<f64> = x.column(target).to_owned();
    let ss_total = y.dot(&y);
    if ss_total == 0.0 {
        return Ok(f64::INFINITY);
    }

    let others: Vec<usize> = (0..x.ncols()).filter(|&j| j != target).collect();
    if others.is_empty() {
        // Nothing to regress on: R² = 0.
        return Ok(1.0);
    }
    let regressors = x.select(Axis(1), &others);

    let fit = regressors.least_squares(&y)?;
    let residual = &y - &regressors.dot(&fit.solution);
    let ss_residual = residual.dot(&residual);

    if ss_residual <= COLLINEARITY_TOLERANCE * ss_total {
        Ok(f64::INFINITY)
    } else {
        Ok(ss_total / ss_residual)
    }
}
