// analysis/artifact.rs

//! Persistence of the fitted standardizer and the production model.
//!
//! A bundle is written as a single human-readable TOML file. Writes go to a
//! hidden temporary sibling that is synced and then renamed over the target,
//! so a failed or interrupted save never leaves a half-written bundle behind
//! and a previously saved bundle stays loadable.

use crate::model::LinearModel;
use crate::standardize::{Standardizer, StandardizerError, StandardizerParams};

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ARTIFACT_PATH: &str = "vinometry.model.toml";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("No saved artifacts were found at {0}. Run the training pipeline first.")]
    NotFound(String),
    #[error("Failed to read or write the artifact bundle: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to parse TOML artifact bundle: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize artifact bundle to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Cannot save a standardizer that has not been fit.")]
    UnfittedStandardizer,
    #[error(
        "Artifact bundle is inconsistent: {features} feature names, {means} means, {scales} scales, {coefficients} coefficients."
    )]
    InconsistentBundle {
        features: usize,
        means: usize,
        scales: usize,
        coefficients: usize,
    },
    #[error("Artifact bundle holds invalid standardizer parameters: {0}")]
    Standardizer(#[from] StandardizerError),
}

/// Everything prediction needs: the feature order, the scaling fitted on the
/// training partition, and the production model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub feature_names: Vec<String>,
    pub standardizer: StandardizerParams,
    pub model: LinearModel,
}

impl ArtifactBundle {
    pub fn new(
        standardizer: &Standardizer,
        model: &LinearModel,
        feature_names: &[String],
    ) -> Result<Self, ArtifactError> {
        let params = standardizer
            .params()
            .ok_or(ArtifactError::UnfittedStandardizer)?;
        let bundle = Self {
            feature_names: feature_names.to_vec(),
            standardizer: params.clone(),
            model: model.clone(),
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Checks that every per-feature vector has the same length.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let features = self.feature_names.len();
        let means = self.standardizer.means.len();
        let scales = self.standardizer.scales.len();
        let coefficients = self.model.coefficients.len();
        if means != features || scales != features || coefficients != features {
            return Err(ArtifactError::InconsistentBundle {
                features,
                means,
                scales,
                coefficients,
            });
        }
        Ok(())
    }

    /// Rebuilds the fitted standardizer.
    pub fn standardizer(&self) -> Result<Standardizer, ArtifactError> {
        Ok(Standardizer::from_params(self.standardizer.clone())?)
    }
}

/// Where trained artifacts live between the training and prediction runs.
pub trait ArtifactStore {
    /// Replaces the stored bundle. On error the previous bundle is untouched.
    fn save(&mut self, bundle: &ArtifactBundle) -> Result<(), ArtifactError>;

    /// Returns the stored bundle, or `ArtifactError::NotFound` when none exists.
    fn load(&self) -> Result<ArtifactBundle, ArtifactError>;
}

/// Stores the bundle as a TOML file.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    path: PathBuf,
}

impl FileArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactStore for FileArtifactStore {
    fn save(&mut self, bundle: &ArtifactBundle) -> Result<(), ArtifactError> {
        bundle.validate()?;
        let toml_string = toml::to_string_pretty(bundle)?;
        internal::write_atomically(&self.path, toml_string.as_bytes())?;
        log::info!("Saved artifact bundle to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<ArtifactBundle, ArtifactError> {
        let toml_string = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let bundle: ArtifactBundle = toml::from_str(&toml_string)?;
        bundle.validate()?;
        log::debug!(
            "Loaded {} bundle with {} features from {}",
            bundle.model.family,
            bundle.feature_names.len(),
            self.path.display()
        );
        Ok(bundle)
    }
}

/// Keeps the bundle in process memory. Used by tests and embedding callers
/// that never touch the filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    bundle: Option<ArtifactBundle>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self { bundle: None }
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(&mut self, bundle: &ArtifactBundle) -> Result<(), ArtifactError> {
        bundle.validate()?;
        self.bundle = Some(bundle.clone());
        Ok(())
    }

    fn load(&self) -> Result<ArtifactBundle, ArtifactError> {
        self.bundle
            .clone()
            .ok_or_else(|| ArtifactError::NotFound("the in-memory store".to_string()))
    }
}

mod internal {
    use super::*;

    /// Writes `bytes` to a fresh hidden file next to `path`, syncs it and
    /// renames it into place. The temporary file is removed on any failure.
    pub(super) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let file_name = path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Artifact path '{}' has no file name.", path.display()),
            )
        })?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let pid = std::process::id();
        let ts_nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        let mut created = None;
        for attempt in 0..32u32 {
            let candidate = directory.join(format!(
                ".{}.{}.{}.tmp",
                file_name.to_string_lossy(),
                pid,
                ts_nanos + attempt as u128
            ));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => {
                    created = Some((candidate, file));
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        let (temp_path, mut file) = created.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!(
                    "Could not create a temporary file next to '{}'.",
                    path.display()
                ),
            )
        })?;

        let write_result = (|| -> io::Result<()> {
            file.write_all(bytes)?;
            file.sync_all()?;
            Ok(())
        })();
        drop(file);

        if let Err(err) = write_result {
            let _ = fs::remove_file(&temp_path);
            return Err(err);
        }

        fs::rename(&temp_path, path).inspect_err(|_| {
            let _ = fs::remove_file(&temp_path);
        })
    }
}
