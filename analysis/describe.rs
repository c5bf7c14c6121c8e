// analysis/describe.rs

//! Exploratory summaries of a loaded table: per-column statistics, the quality
//! distribution, mean quality by alcohol band and the Pearson correlation
//! matrix. The training report reuses the correlation pairs of the filtered
//! table.

use crate::data::{DataError, QUALITY_COLUMN, WineTable};
use crate::outliers::quantile_sorted;

use itertools::Itertools;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ALCOHOL_COLUMN: &str = "alcohol";

/// Right-closed alcohol bands `(lower, upper]`.
const ALCOHOL_BANDS: [(&str, f64, f64); 4] = [
    ("Low", 0.0, 9.0),
    ("Medium", 9.0, 11.0),
    ("High", 11.0, 13.0),
    ("Very High", 13.0, 20.0),
];

/// Quality scores always listed in the distribution, even when unobserved.
const QUALITY_SCORES: std::ops::RangeInclusive<i64> = 3..=8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (ddof = 1). NaN with fewer than two rows.
    pub std: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlcoholBand {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    /// `None` when no sample falls in the band.
    pub mean_quality: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

/// One off-diagonal cell of a correlation matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub first: String,
    pub second: String,
    pub r: f64,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[[i, j]])
    }

    /// Upper triangle in column order, diagonal excluded.
    pub fn pairs(&self) -> Vec<CorrelationEntry> {
        (0..self.columns.len())
            .tuple_combinations()
            .map(|(i, j)| CorrelationEntry {
                first: self.columns[i].clone(),
                second: self.columns[j].clone(),
                r: self.values[[i, j]],
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetDescription {
    pub n_rows: usize,
    pub summaries: Vec<ColumnSummary>,
    pub quality_counts: BTreeMap<i64, usize>,
    pub alcohol_bands: Vec<AlcoholBand>,
    pub correlations: CorrelationMatrix,
}

pub fn describe(table: &WineTable) -> Result<DatasetDescription, DataError> {
    Ok(DatasetDescription {
        n_rows: table.n_rows(),
        summaries: column_summaries(table),
        quality_counts: quality_distribution(table)?,
        alcohol_bands: quality_by_alcohol_band(table)?,
        correlations: correlation_matrix(table),
    })
}

pub fn column_summaries(table: &WineTable) -> Vec<ColumnSummary> {
    table
        .columns()
        .iter()
        .zip(table.values().axis_iter(Axis(1)))
        .map(|(name, column)| summarize(name, column))
        .collect()
}

fn summarize(name: &str, column: ArrayView1<f64>) -> ColumnSummary {
    let count = column.len();
    let mut sorted = column.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (mean, std) = match count {
        0 => (f64::NAN, f64::NAN),
        1 => (sorted[0], f64::NAN),
        _ => (column.sum() / count as f64, column.std(1.0)),
    };
    ColumnSummary {
        column: name.to_string(),
        count,
        mean,
        std,
        min: sorted.first().copied().unwrap_or(f64::NAN),
        q1: quantile_sorted(&sorted, 0.25),
        median: quantile_sorted(&sorted, 0.5),
        q3: quantile_sorted(&sorted, 0.75),
        max: sorted.last().copied().unwrap_or(f64::NAN),
    }
}

/// Samples per quality score. Scores 3 to 8 are always present.
pub fn quality_distribution(table: &WineTable) -> Result<BTreeMap<i64, usize>, DataError> {
    let mut counts: BTreeMap<i64, usize> = QUALITY_SCORES.map(|score| (score, 0)).collect();
    for &q in table.column(QUALITY_COLUMN)? {
        *counts.entry(q.round() as i64).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Mean quality of the samples in each alcohol band. Values outside every band
/// are ignored.
pub fn quality_by_alcohol_band(table: &WineTable) -> Result<Vec<AlcoholBand>, DataError> {
    let alcohol = table.column(ALCOHOL_COLUMN)?;
    let quality = table.column(QUALITY_COLUMN)?;

    Ok(ALCOHOL_BANDS
        .iter()
        .map(|&(label, lower, upper)| {
            let in_band: Vec<f64> = alcohol
                .iter()
                .zip(quality.iter())
                .filter(|&(&a, _)| a > lower && a <= upper)
                .map(|(_, &q)| q)
                .collect();
            let mean_quality = if in_band.is_empty() {
                None
            } else {
                Some(in_band.iter().sum::<f64>() / in_band.len() as f64)
            };
            AlcoholBand {
                label: label.to_string(),
                lower,
                upper,
                count: in_band.len(),
                mean_quality,
            }
        })
        .collect())
}

/// Pearson correlation between every pair of columns. A zero-variance column
/// correlates as NaN with everything, itself included.
pub fn correlation_matrix(table: &WineTable) -> CorrelationMatrix {
    let values = table.values();
    let p = values.ncols();
    let mut corr = Array2::<f64>::from_elem((p, p), f64::NAN);

    if let Some(means) = values.mean_axis(Axis(0)) {
        let centered = &values - &means;
        let gram = centered.t().dot(&centered);
        let norm = |i: usize| gram[[i, i]].sqrt();

        for i in 0..p {
            if gram[[i, i]] > 0.0 {
                corr[[i, i]] = 1.0;
            }
        }
        for (i, j) in (0..p).tuple_combinations() {
            let denom = norm(i) * norm(j);
            if denom > 0.0 {
                let r = (gram[[i, j]] / denom).clamp(-1.0, 1.0);
                corr[[i, j]] = r;
                corr[[j, i]] = r;
            }
        }
    }

    CorrelationMatrix {
        columns: table.columns().to_vec(),
        values: corr,
    }
}
