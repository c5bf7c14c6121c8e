use crate::data::{DataError, WineTable};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tukey's fence multiplier applied to the interquartile range.
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

#[derive(Error, Debug)]
pub enum OutlierError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("The IQR multiplier must be finite and positive, but was {0}.")]
    InvalidMultiplier(f64),
}

/// The closed interval `[lower, upper]` a column's values must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrFence {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrFence {
    /// Computes the fence from a column's first and third quartiles.
    /// Returns `None` for an empty column, which has no quartiles.
    pub fn from_values(values: ArrayView1<f64>, multiplier: f64) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(|a, b| a.total_cmp(b));
        let q1 = quantile_sorted(&sorted, 0.25);
        let q3 = quantile_sorted(&sorted, 0.75);
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// A fence bound to the column it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFence {
    pub column: String,
    pub fence: IqrFence,
}

/// Result of one filtering pass.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub table: WineTable,
    pub fences: Vec<ColumnFence>,
    pub rows_before: usize,
    pub rows_after: usize,
}

/// Linear-interpolation quantile of already sorted data, `q` in `[0, 1]`.
/// NaN for empty input.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let float_idx = (n as f64 - 1.0) * q;
    let lower_idx = float_idx.floor() as usize;
    let upper_idx = float_idx.ceil() as usize;

    if lower_idx == upper_idx {
        sorted[lower_idx]
    } else {
        let fraction = float_idx - lower_idx as f64;
        sorted[lower_idx] + (sorted[upper_idx] - sorted[lower_idx]) * fraction
    }
}

/// Computes one fence per named column. An empty table yields no fences.
pub fn compute_fences(
    table: &WineTable,
    columns: &[String],
    multiplier: f64,
) -> Result<Vec<ColumnFence>, OutlierError> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(OutlierError::InvalidMultiplier(multiplier));
    }
    let mut fences = Vec::with_capacity(columns.len());
    for name in columns {
        let values = table.column(name)?;
        if let Some(fence) = IqrFence::from_values(values, multiplier) {
            fences.push(ColumnFence {
                column: name.clone(),
                fence,
            });
        }
    }
    Ok(fences)
}

/// Keeps the rows that sit inside every fence. A row violating any single
/// fence is dropped.
pub fn apply_fences(table: &WineTable, fences: &[ColumnFence]) -> Result<WineTable, OutlierError> {
    let indexed: Vec<(usize, &IqrFence)> = fences
        .iter()
        .map(|f| table.column_index(&f.column).map(|idx| (idx, &f.fence)))
        .collect::<Result<_, _>>()?;

    let values = table.values();
    let keep: Vec<usize> = (0..table.n_rows())
        .filter(|&row| {
            indexed
                .iter()
                .all(|&(col, fence)| fence.contains(values[[row, col]]))
        })
        .collect();

    Ok(table.select_rows(&keep))
}

/// Computes fences on `columns` of `table` and removes every row outside them.
pub fn filter_outliers(
    table: &WineTable,
    columns: &[String],
    multiplier: f64,
) -> Result<FilterOutcome, OutlierError> {
    let fences = compute_fences(table, columns, multiplier)?;
    for f in &fences {
        if f.fence.iqr() == 0.0 {
            log::warn!(
                "Column '{}' has zero interquartile range; only rows equal to {} survive.",
                f.column,
                f.fence.q1
            );
        }
    }

    let filtered = apply_fences(table, &fences)?;
    log::info!(
        "Outlier filter kept {} of {} rows ({} removed).",
        filtered.n_rows(),
        table.n_rows(),
        table.n_rows() - filtered.n_rows()
    );

    Ok(FilterOutcome {
        rows_before: table.n_rows(),
        rows_after: filtered.n_rows(),
        table: filtered,
        fences,
    })
}
