//! Feature/target separation and the row partitions used for training:
//! the seeded train/test split and the k-fold splitter driving cross-validation.

use crate::data::WineTable;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("The required column '{0}' is missing from the filtered table.")]
    ColumnNotFound(String),
    #[error("No feature columns remain after excluding the target and {excluded:?}.")]
    NoFeatures { excluded: Vec<String> },
    #[error("Feature matrix has {x_rows} rows but target has {y_len} entries.")]
    LengthMismatch { x_rows: usize, y_len: usize },
    #[error("Test fraction must lie strictly between 0 and 1, but was {0}.")]
    InvalidTestFraction(f64),
    #[error(
        "Cannot split {n_samples} samples with test fraction {test_fraction}: train size {n_train}, test size {n_test}."
    )]
    DegenerateSplit {
        n_samples: usize,
        test_fraction: f64,
        n_train: usize,
        n_test: usize,
    },
    #[error("K-fold cross-validation needs at least 2 folds, but {0} were requested.")]
    TooFewFolds(usize),
    #[error("Cannot build {n_splits} folds from only {n_samples} samples.")]
    TooFewSamplesForFolds { n_samples: usize, n_splits: usize },
}

/// The model inputs separated from the target, with the canonical feature order.
#[derive(Debug, Clone)]
pub struct FeatureTargetSplit {
    pub features: Array2<f64>,
    pub target: Array1<f64>,
    /// Column order of `features`. The prediction path must reproduce it exactly.
    pub feature_names: Vec<String>,
}

/// Separates `target` from the feature columns, dropping `excluded` columns.
/// Every excluded column must exist; they are kept out of the model but remain
/// part of the table for diagnostics.
pub fn split_features_target(
    table: &WineTable,
    target: &str,
    excluded: &[String],
) -> Result<FeatureTargetSplit, SplitError> {
    let target_idx = table
        .column_index(target)
        .map_err(|_| SplitError::ColumnNotFound(target.to_string()))?;
    for name in excluded {
        if table.column_index(name).is_err() {
            return Err(SplitError::ColumnNotFound(name.clone()));
        }
    }

    let feature_idx: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, name)| *idx != target_idx && !excluded.contains(*name))
        .map(|(idx, _)| idx)
        .collect();
    if feature_idx.is_empty() {
        return Err(SplitError::NoFeatures {
            excluded: excluded.to_vec(),
        });
    }

    let feature_names = feature_idx
        .iter()
        .map(|&idx| table.columns()[idx].clone())
        .collect();
    let values = table.values();

    Ok(FeatureTargetSplit {
        features: values.select(Axis(1), &feature_idx),
        target: values.column(target_idx).to_owned(),
        feature_names,
    })
}

/// A shuffled hold-out partition of the rows.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Shuffles the rows with a seeded RNG and holds out `ceil(test_fraction * n)`
/// of them. The first rows of the permutation form the test set.
pub fn train_test_split(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit, SplitError> {
    if x.nrows() != y.len() {
        return Err(SplitError::LengthMismatch {
            x_rows: x.nrows(),
            y_len: y.len(),
        });
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(SplitError::InvalidTestFraction(test_fraction));
    }

    let n_samples = x.nrows();
    let n_test = (test_fraction * n_samples as f64).ceil() as usize;
    let n_train = n_samples.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(SplitError::DegenerateSplit {
            n_samples,
            test_fraction,
            n_train,
            n_test,
        });
    }

    let mut permutation: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    permutation.shuffle(&mut rng);

    let test_indices = permutation[..n_test].to_vec();
    let train_indices = permutation[n_test..].to_vec();

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), &train_indices),
        x_test: x.select(Axis(0), &test_indices),
        y_train: y.select(Axis(0), &train_indices),
        y_test: y.select(Axis(0), &test_indices),
        train_indices,
        test_indices,
    })
}

/// One cross-validation fold: rows to fit on and rows to score on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Contiguous, unshuffled k-fold splitter. The first `n % k` folds receive one
/// extra sample, so fold assignment depends only on `n` and `k`.
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    pub fn new(n_splits: usize) -> Result<Self, SplitError> {
        if n_splits < 2 {
            return Err(SplitError::TooFewFolds(n_splits));
        }
        Ok(Self { n_splits })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>, SplitError> {
        if n_samples < self.n_splits {
            return Err(SplitError::TooFewSamplesForFolds {
                n_samples,
                n_splits: self.n_splits,
            });
        }

        let fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let size = if i < remainder { fold_size + 1 } else { fold_size };
            let end = start + size;
            let validation: Vec<usize> = (start..end).collect();
            let train: Vec<usize> = (0..start).chain(end..n_samples).collect();
            folds.push(Fold { train, validation });
            start = end;
        }
        Ok(folds)
    }
}
