//! # Data Loading and Validation Module
//!
//! This module is the single entry point for the wine measurement table. It reads
//! a comma-separated file, validates it against the fixed wine schema and turns it
//! into the `WineTable` consumed by the rest of the crate.
//!
//! - Strict Schema: the eleven physicochemical columns and `quality` must be
//!   present under their exact names. The redundant `alcohol_level` category is
//!   dropped on load.
//! - User-Centric Errors: failures are assumed to be problems with the input
//!   file, and every `DataError` names the offending column or row.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// The integer quality score assigned by tasters. Always the regression target.
pub const QUALITY_COLUMN: &str = "quality";

/// Categorical restatement of `alcohol`; removed before any analysis.
pub const ALCOHOL_LEVEL_COLUMN: &str = "alcohol_level";

pub const DENSITY_COLUMN: &str = "density";
pub const PH_COLUMN: &str = "pH";

/// The physicochemical measurements, in the order they appear in the dataset.
pub const PHYSICOCHEMICAL_COLUMNS: [&str; 11] = [
    "fixed acidity",
    "volatile acidity",
    "citric acid",
    "residual sugar",
    "chlorides",
    "free sulfur dioxide",
    "total sulfur dioxide",
    DENSITY_COLUMN,
    PH_COLUMN,
    "sulphates",
    "alcohol",
];

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input table. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("The column '{0}' appears more than once in the input table.")]
    DuplicateColumn(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the column '{0}'. Complete data with no missing values is required."
    )]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in the column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("The quality score {value} at row {row} is not an integer.")]
    NonIntegerQuality { row: usize, value: f64 },
    #[error("Table has {columns} column names but the value matrix has {matrix_cols} columns.")]
    ShapeMismatch { columns: usize, matrix_cols: usize },
}

/// A validated, fully numeric wine table. Columns keep the order of the source
/// file; rows are samples.
#[derive(Debug, Clone, PartialEq)]
pub struct WineTable {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl WineTable {
    /// Builds a table from column names and a `[n_rows, n_columns]` matrix.
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self, DataError> {
        if columns.len() != values.ncols() {
            return Err(DataError::ShapeMismatch {
                columns: columns.len(),
                matrix_cols: values.ncols(),
            });
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(DataError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Position of `name` in the column order.
    pub fn column_index(&self, name: &str) -> Result<usize, DataError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>, DataError> {
        let idx = self.column_index(name)?;
        Ok(self.values.column(idx))
    }

    /// Returns a new table containing only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> WineTable {
        WineTable {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }
}

/// Loads and validates the wine dataset for description and training.
pub fn load_dataset(path: &str) -> Result<WineTable, DataError> {
    let mut df = internal::read_csv(path)?;

    let names = internal::column_names(&df);
    if names.iter().any(|c| c == ALCOHOL_LEVEL_COLUMN) {
        df = df.drop(ALCOHOL_LEVEL_COLUMN)?;
        log::info!("Dropped redundant '{ALCOHOL_LEVEL_COLUMN}' column.");
    }

    let names = internal::column_names(&df);
    let present: HashSet<&str> = names.iter().map(String::as_str).collect();
    for required in PHYSICOCHEMICAL_COLUMNS.iter().chain([QUALITY_COLUMN].iter()) {
        if !present.contains(required) {
            return Err(DataError::ColumnNotFound(required.to_string()));
        }
    }

    // Every remaining column is analysed, so every remaining column must be numeric.
    let values = internal::numeric_matrix(&df, &names)?;
    let table = WineTable::new(names, values)?;

    let quality = table.column(QUALITY_COLUMN)?;
    for (row, &value) in quality.iter().enumerate() {
        if value.fract() != 0.0 {
            return Err(DataError::NonIntegerQuality {
                row: row + 1,
                value,
            });
        }
    }

    log::info!(
        "Loaded {} samples with {} numeric columns from '{path}'.",
        table.n_rows(),
        table.n_columns()
    );
    Ok(table)
}

/// Loads records for batch prediction. Only the requested feature columns are
/// read; they are returned in exactly the order of `feature_names`.
pub fn load_prediction_records(
    path: &str,
    feature_names: &[String],
) -> Result<Array2<f64>, DataError> {
    let df = internal::read_csv(path)?;
    let names = internal::column_names(&df);
    let present: HashSet<&str> = names.iter().map(String::as_str).collect();
    for required in feature_names {
        if !present.contains(required.as_str()) {
            return Err(DataError::ColumnNotFound(required.clone()));
        }
    }
    let values = internal::numeric_matrix(&df, feature_names)?;
    log::info!(
        "Loaded {} records for prediction from '{path}'.",
        values.nrows()
    );
    Ok(values)
}

/// Internal module for shared data loading logic.
mod internal {
    use super::*;

    pub(super) fn read_csv(path: &str) -> Result<DataFrame, DataError> {
        let df = CsvReader::new(File::open(Path::new(path))?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(b',')),
            )
            .finish()?;
        log::debug!("Read {} rows x {} columns from '{path}'.", df.height(), df.width());
        Ok(df)
    }

    pub(super) fn column_names(df: &DataFrame) -> Vec<String> {
        df.get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }

        let casted = series
            .cast(&DataType::Float64)
            .map_err(|_| DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            })?;

        // A string column casts "successfully" into nulls, so re-check after the cast.
        if casted.null_count() > 0 {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }

        let values: Vec<f64> = casted.f64()?.rechunk().into_no_null_iter().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(values)
    }

    /// Stacks the named columns into a row-major `[n_rows, names.len()]` matrix.
    pub(super) fn numeric_matrix(df: &DataFrame, names: &[String]) -> Result<Array2<f64>, DataError> {
        let n_rows = df.height();
        let mut values = Array2::<f64>::zeros((n_rows, names.len()));
        for (j, name) in names.iter().enumerate() {
            let column = extract_numeric_column(df, name)?;
            for (i, v) in column.into_iter().enumerate() {
                values[[i, j]] = v;
            }
        }
        Ok(values)
    }
}
