// analysis/pipeline.rs

//! # Training Pipeline
//!
//! Runs the whole training flow on an already loaded table:
//!
//! 1.  Filters outliers with IQR fences computed over every numeric column.
//! 2.  Reports variance inflation factors and pairwise correlations of the
//!     filtered table.
//! 3.  Separates features from the target, then holds out a seeded test split.
//! 4.  Standardizes with parameters fit on the training rows only.
//! 5.  Fits OLS, and ridge and lasso through a cross-validated alpha search.
//! 6.  Evaluates every model on the held-out rows.
//! 7.  Persists the standardizer, the ridge model and the feature order.
//!
//! The bundle is written last. Any earlier failure aborts the run and leaves a
//! previously stored bundle untouched.

use crate::artifact::{ArtifactBundle, ArtifactError, ArtifactStore};
use crate::config::{ConfigError, PipelineConfig};
use crate::data::{DataError, WineTable};
use crate::describe::{CorrelationEntry, correlation_matrix};
use crate::estimate::{
    AlphaScore, EstimationError, Penalty, RegressionFit, fit_ols, grid_search,
};
use crate::evaluate::{EvaluationError, RegressionMetrics, evaluate};
use crate::model::{ModelError, ModelFamily};
use crate::outliers::{ColumnFence, OutlierError, filter_outliers};
use crate::split::{KFold, SplitError, split_features_target, train_test_split};
use crate::standardize::{Standardizer, StandardizerError};
use crate::vif::{VifEntry, VifError, variance_inflation_factors};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("Outlier filtering failed: {0}")]
    Outliers(#[from] OutlierError),
    #[error("Splitting the data failed: {0}")]
    Split(#[from] SplitError),
    #[error("Standardization failed: {0}")]
    Standardizer(#[from] StandardizerError),
    #[error("Collinearity diagnostics failed: {0}")]
    Vif(#[from] VifError),
    #[error("Model estimation failed: {0}")]
    Estimation(#[from] EstimationError),
    #[error("Model evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
    #[error("Prediction on the test split failed: {0}")]
    Model(#[from] ModelError),
    #[error("Persisting the trained artifacts failed: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("Failed to serialize the training report to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Failed to write the training report: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientEntry {
    pub feature: String,
    pub coefficient: f64,
}

/// Everything reported about one fitted model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub family: ModelFamily,
    pub alpha: Option<f64>,
    pub intercept: f64,
    pub converged: bool,
    /// Held-out test metrics.
    pub metrics: RegressionMetrics,
    pub coefficients: Vec<CoefficientEntry>,
    /// Cross-validation curve in grid order. Empty for OLS.
    pub cv_scores: Vec<AlphaScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub rows_before_filter: usize,
    pub rows_after_filter: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// The family persisted for prediction. Always ridge.
    pub production_family: ModelFamily,
    /// Settings the run was trained with, after every override.
    pub config: PipelineConfig,
    pub feature_names: Vec<String>,
    pub fences: Vec<ColumnFence>,
    pub vif: Vec<VifEntry>,
    /// Pearson correlations of the filtered table, upper triangle only.
    pub correlations: Vec<CorrelationEntry>,
    pub models: Vec<ModelReport>,
}

impl TrainingReport {
    pub fn model(&self, family: ModelFamily) -> Option<&ModelReport> {
        self.models.iter().find(|m| m.family == family)
    }

    /// Writes the report as pretty TOML.
    pub fn save(&self, path: &str) -> Result<(), PipelineError> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }
}

/// Trains every model family on `table` and saves the production bundle to `store`.
pub fn run_training_pipeline<S: ArtifactStore + ?Sized>(
    table: &WineTable,
    config: &PipelineConfig,
    store: &mut S,
) -> Result<TrainingReport, PipelineError> {
    config.validate()?;

    // --- Stage 1: Outliers and diagnostics ---
    let filtered = filter_outliers(table, table.columns(), config.iqr_multiplier)?;
    let vif = variance_inflation_factors(&filtered.table)?;
    for entry in &vif {
        log::info!("VIF {:<22} {:>10.3}", entry.column, entry.vif);
    }
    let correlations = correlation_matrix(&filtered.table).pairs();

    // --- Stage 2: Features, target and the held-out split ---
    let split = split_features_target(&filtered.table, &config.target, &config.excluded_features)?;
    let partition = train_test_split(
        split.features.view(),
        split.target.view(),
        config.test_fraction,
        config.seed,
    )?;
    log::info!(
        "Training on {} rows, testing on {} rows with {} features.",
        partition.y_train.len(),
        partition.y_test.len(),
        split.feature_names.len()
    );

    let mut standardizer = Standardizer::new();
    let x_train = standardizer.fit_transform(partition.x_train.view())?;
    let x_test = standardizer.transform(partition.x_test.view())?;

    // --- Stage 3: Fitting ---
    let folds = KFold::new(config.cv_folds)?.split(x_train.nrows())?;
    let alphas = config.alphas();

    let ols = fit_ols(x_train.view(), partition.y_train.view())?;
    let ridge = grid_search(
        x_train.view(),
        partition.y_train.view(),
        Penalty::Ridge,
        &alphas,
        &folds,
    )?;
    let lasso = grid_search(
        x_train.view(),
        partition.y_train.view(),
        Penalty::Lasso(config.lasso_settings()),
        &alphas,
        &folds,
    )?;

    // --- Stage 4: Evaluation ---
    let models = vec![
        internal::report_model(&ols, Vec::new(), &split.feature_names, &x_test, &partition.y_test)?,
        internal::report_model(
            &ridge.fit,
            ridge.scores,
            &split.feature_names,
            &x_test,
            &partition.y_test,
        )?,
        internal::report_model(
            &lasso.fit,
            lasso.scores,
            &split.feature_names,
            &x_test,
            &partition.y_test,
        )?,
    ];

    // --- Stage 5: Persistence ---
    let bundle = ArtifactBundle::new(&standardizer, &ridge.fit.model, &split.feature_names)?;
    store.save(&bundle)?;

    Ok(TrainingReport {
        rows_before_filter: filtered.rows_before,
        rows_after_filter: filtered.rows_after,
        train_rows: partition.y_train.len(),
        test_rows: partition.y_test.len(),
        production_family: bundle.model.family,
        config: config.clone(),
        feature_names: split.feature_names,
        fences: filtered.fences,
        vif,
        correlations,
        models,
    })
}

mod internal {
    use super::*;

    pub(super) fn report_model(
        fit: &RegressionFit,
        cv_scores: Vec<AlphaScore>,
        feature_names: &[String],
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<ModelReport, PipelineError> {
        let predictions = fit.model.predict(x_test.view())?;
        let metrics = evaluate(y_test.view(), predictions.view())?;
        log::info!(
            "{}: MAE {:.4}, MSE {:.4}, RMSE {:.4}, R² {:.4}",
            fit.model.family,
            metrics.mae,
            metrics.mse,
            metrics.rmse,
            metrics.r2
        );

        let coefficients = feature_names
            .iter()
            .zip(&fit.model.coefficients)
            .map(|(feature, &coefficient)| CoefficientEntry {
                feature: feature.clone(),
                coefficient,
            })
            .collect();

        Ok(ModelReport {
            family: fit.model.family,
            alpha: fit.model.alpha,
            intercept: fit.model.intercept,
            converged: fit.converged,
            metrics,
            coefficients,
            cv_scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifactStore;
    use crate::data::{PHYSICOCHEMICAL_COLUMNS, QUALITY_COLUMN};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Uniform measurements with a quality score driven by alcohol and sulphates.
    fn synthetic_wines(n: usize, seed: u64) -> WineTable {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut columns: Vec<String> = PHYSICOCHEMICAL_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.push(QUALITY_COLUMN.to_string());

        let mut values = Array2::<f64>::zeros((n, columns.len()));
        for i in 0..n {
            for j in 0..PHYSICOCHEMICAL_COLUMNS.len() {
                values[[i, j]] = rng.gen_range(1.0..2.0) * (j as f64 + 1.0);
            }
            let alcohol = values[[i, 10]];
            let sulphates = values[[i, 9]];
            let score = 5.5 + 0.6 * (alcohol - 16.5) + 0.4 * (sulphates - 15.0) + rng.gen_range(-0.4..0.4);
            values[[i, 11]] = score.round().clamp(3.0, 8.0);
        }
        WineTable::new(columns, values).unwrap()
    }

    #[test]
    fn test_pipeline_trains_and_persists_ridge() {
        let table = synthetic_wines(300, 11);
        let mut store = MemoryArtifactStore::new();
        let report = run_training_pipeline(&table, &PipelineConfig::default(), &mut store).unwrap();

        assert_eq!(report.rows_before_filter, 300);
        assert!(report.rows_after_filter <= 300);
        assert_eq!(report.train_rows + report.test_rows, report.rows_after_filter);
        assert_eq!(report.vif.len(), 12);
        assert_eq!(report.correlations.len(), 12 * 11 / 2);
        let alcohol_quality = report
            .correlations
            .iter()
            .find(|e| e.first == "alcohol" && e.second == QUALITY_COLUMN)
            .unwrap();
        assert!(alcohol_quality.r > 0.3 && alcohol_quality.r <= 1.0);
        assert_eq!(report.feature_names.len(), 9);
        assert!(!report.feature_names.iter().any(|f| f == "density" || f == "pH"));
        assert_eq!(report.models.len(), 3);

        let ridge = report.model(ModelFamily::Ridge).unwrap();
        assert_eq!(ridge.cv_scores.len(), 20);
        assert!(ridge.alpha.is_some());
        assert!(report.model(ModelFamily::Ols).unwrap().cv_scores.is_empty());

        let bundle = store.load().unwrap();
        assert_eq!(bundle.model.family, ModelFamily::Ridge);
        assert_eq!(bundle.model.alpha, ridge.alpha);
        assert_eq!(bundle.feature_names, report.feature_names);
    }

    #[test]
    fn test_pipeline_is_reproducible() {
        let table = synthetic_wines(200, 12);
        let mut first_store = MemoryArtifactStore::new();
        let mut second_store = MemoryArtifactStore::new();
        let first = run_training_pipeline(&table, &PipelineConfig::default(), &mut first_store).unwrap();
        let second = run_training_pipeline(&table, &PipelineConfig::default(), &mut second_store).unwrap();
        assert_eq!(first, second);
        assert_eq!(first_store.load().unwrap(), second_store.load().unwrap());
    }

    #[test]
    fn test_failed_run_leaves_previous_bundle() {
        let table = synthetic_wines(200, 13);
        let mut store = MemoryArtifactStore::new();
        run_training_pipeline(&table, &PipelineConfig::default(), &mut store).unwrap();
        let saved = store.load().unwrap();

        let mut config = PipelineConfig::default();
        config.excluded_features.push("tannins".to_string());
        match run_training_pipeline(&table, &config, &mut store) {
            Err(PipelineError::Split(SplitError::ColumnNotFound(column))) => {
                assert_eq!(column, "tannins")
            }
            other => panic!("Expected a missing-column error, got {:?}", other),
        }
        assert_eq!(store.load().unwrap(), saved);
    }

    #[test]
    fn test_invalid_config_aborts_before_training() {
        let table = synthetic_wines(50, 14);
        let mut store = MemoryArtifactStore::new();
        let mut config = PipelineConfig::default();
        config.cv_folds = 0;
        assert!(matches!(
            run_training_pipeline(&table, &config, &mut store),
            Err(PipelineError::Config(_))
        ));
        assert!(store.load().is_err());
    }

    #[test]
    fn test_report_serializes_to_toml() {
        let table = synthetic_wines(120, 15);
        let mut store = MemoryArtifactStore::new();
        let report = run_training_pipeline(&table, &PipelineConfig::default(), &mut store).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.toml");
        report.save(path.to_str().unwrap()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("production_family = \"Ridge\""));
        assert!(text.contains("cv_folds = 10"));
    }
}
