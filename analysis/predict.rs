// analysis/predict.rs

//! Quality prediction from persisted artifacts.
//!
//! A record arrives as a map from feature name to value. It is checked against
//! the stored feature names, reordered into the training order, standardized
//! with the stored parameters and scored by the stored model. The raw score is
//! rounded half away from zero and mapped to a quality label.

use crate::artifact::{ArtifactBundle, ArtifactError, ArtifactStore};
use crate::data::DataError;
use crate::model::{LinearModel, ModelError};
use crate::standardize::{Standardizer, StandardizerError};

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

pub const UNKNOWN_LABEL: &str = "Unknown";

const QUALITY_LABELS: [(i64, &str); 6] = [
    (3, "Low"),
    (4, "Below Average"),
    (5, "Average"),
    (6, "Good"),
    (7, "Very Good"),
    (8, "Excellent"),
];

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("No trained model is available ({0}). Run the training pipeline first.")]
    NoArtifacts(String),
    #[error("Failed to load the trained artifacts: {0}")]
    Artifact(ArtifactError),
    #[error("The input record is missing the feature '{0}'.")]
    MissingFeature(String),
    #[error("The input record has the feature '{0}', which the model was not trained on.")]
    UnexpectedFeature(String),
    #[error("The feature '{feature}' has the non-finite value {value}.")]
    NonFiniteFeature { feature: String, value: f64 },
    #[error(transparent)]
    Standardizer(#[from] StandardizerError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("Failed to write predictions: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<ArtifactError> for PredictionError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(location) => PredictionError::NoArtifacts(location),
            other => PredictionError::Artifact(other),
        }
    }
}

/// Label for a rounded quality score.
pub fn quality_label(score: i64) -> &'static str {
    QUALITY_LABELS
        .iter()
        .find(|(s, _)| *s == score)
        .map(|(_, label)| *label)
        .unwrap_or(UNKNOWN_LABEL)
}

/// One wine described by the nine model features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WineSample {
    pub fixed_acidity: f64,
    pub volatile_acidity: f64,
    pub citric_acid: f64,
    pub residual_sugar: f64,
    pub chlorides: f64,
    pub free_sulfur_dioxide: f64,
    pub total_sulfur_dioxide: f64,
    pub sulphates: f64,
    pub alcohol: f64,
}

impl Default for WineSample {
    /// The first sample of the red wine dataset.
    fn default() -> Self {
        Self {
            fixed_acidity: 7.4,
            volatile_acidity: 0.7,
            citric_acid: 0.0,
            residual_sugar: 1.9,
            chlorides: 0.076,
            free_sulfur_dioxide: 11.0,
            total_sulfur_dioxide: 34.0,
            sulphates: 0.56,
            alcohol: 9.4,
        }
    }
}

impl WineSample {
    /// The sample keyed by dataset column names.
    pub fn to_record(&self) -> BTreeMap<String, f64> {
        [
            ("fixed acidity", self.fixed_acidity),
            ("volatile acidity", self.volatile_acidity),
            ("citric acid", self.citric_acid),
            ("residual sugar", self.residual_sugar),
            ("chlorides", self.chlorides),
            ("free sulfur dioxide", self.free_sulfur_dioxide),
            ("total sulfur dioxide", self.total_sulfur_dioxide),
            ("sulphates", self.sulphates),
            ("alcohol", self.alcohol),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityPrediction {
    /// Unrounded model output.
    pub score: f64,
    pub rounded: i64,
    pub label: String,
}

impl QualityPrediction {
    pub fn from_score(score: f64) -> Self {
        // f64::round rounds half away from zero.
        let rounded = score.round() as i64;
        Self {
            score,
            rounded,
            label: quality_label(rounded).to_string(),
        }
    }
}

/// A loaded bundle ready to score records.
#[derive(Debug, Clone)]
pub struct Predictor {
    feature_names: Vec<String>,
    standardizer: Standardizer,
    model: LinearModel,
}

impl Predictor {
    pub fn from_store<S: ArtifactStore + ?Sized>(store: &S) -> Result<Self, PredictionError> {
        Self::from_bundle(store.load()?)
    }

    pub fn from_bundle(bundle: ArtifactBundle) -> Result<Self, PredictionError> {
        bundle.validate()?;
        let standardizer = bundle.standardizer()?;
        Ok(Self {
            feature_names: bundle.feature_names,
            standardizer,
            model: bundle.model,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    /// Orders `record` by the stored feature names. Missing and unknown fields
    /// are both rejected.
    pub fn align(&self, record: &BTreeMap<String, f64>) -> Result<Array1<f64>, PredictionError> {
        let mut row = Array1::<f64>::zeros(self.feature_names.len());
        for (j, name) in self.feature_names.iter().enumerate() {
            let value = *record
                .get(name)
                .ok_or_else(|| PredictionError::MissingFeature(name.clone()))?;
            if !value.is_finite() {
                return Err(PredictionError::NonFiniteFeature {
                    feature: name.clone(),
                    value,
                });
            }
            row[j] = value;
        }
        if let Some(unexpected) = record.keys().find(|k| !self.feature_names.contains(*k)) {
            return Err(PredictionError::UnexpectedFeature(unexpected.clone()));
        }
        Ok(row)
    }

    pub fn predict_record(
        &self,
        record: &BTreeMap<String, f64>,
    ) -> Result<QualityPrediction, PredictionError> {
        let row = self.align(record)?;
        let standardized = self.standardizer.transform_row(row.view())?;
        let score = self.model.predict_one(standardized.view())?;
        log::debug!("Predicted raw quality {score:.4} for {record:?}");
        Ok(QualityPrediction::from_score(score))
    }

    pub fn predict_sample(&self, sample: &WineSample) -> Result<QualityPrediction, PredictionError> {
        self.predict_record(&sample.to_record())
    }

    /// Scores every row of `x`, whose columns already follow `feature_names()`.
    pub fn predict_matrix(
        &self,
        x: ArrayView2<f64>,
    ) -> Result<Vec<QualityPrediction>, PredictionError> {
        let standardized = self.standardizer.transform(x)?;
        let scores = self.model.predict(standardized.view())?;
        Ok(scores.iter().map(|&s| QualityPrediction::from_score(s)).collect())
    }
}

/// Writes one tab-separated line per prediction, preceded by a header.
pub fn write_predictions(path: &Path, predictions: &[QualityPrediction]) -> Result<(), PredictionError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "row\tpredicted_quality\trounded_quality\tlabel")?;
    for (i, p) in predictions.iter().enumerate() {
        writeln!(writer, "{}\t{:.6}\t{}\t{}", i + 1, p.score, p.rounded, p.label)?;
    }
    writer.flush()?;
    log::info!("Wrote {} predictions to {}", predictions.len(), path.display());
    Ok(())
}
