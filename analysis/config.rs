// analysis/config.rs

use crate::data::{DENSITY_COLUMN, PH_COLUMN, QUALITY_COLUMN};
use crate::estimate::{
    DEFAULT_LASSO_MAX_ITERATIONS, DEFAULT_LASSO_TOLERANCE, LassoSettings, log_spaced_grid,
};
use crate::outliers::DEFAULT_IQR_MULTIPLIER;

use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Log-spaced regularization grid, `points` values from `10^min_exponent` to `10^max_exponent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlphaGridConfig {
    pub min_exponent: f64,
    pub max_exponent: f64,
    pub points: usize,
}

impl Default for AlphaGridConfig {
    fn default() -> Self {
        Self {
            min_exponent: -3.0,
            max_exponent: 3.0,
            points: 20,
        }
    }
}

/// Every tunable of a training run. Missing keys in a TOML file fall back to
/// the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub iqr_multiplier: f64,
    pub test_fraction: f64,
    pub seed: u64,
    pub cv_folds: usize,
    pub alpha_grid: AlphaGridConfig,
    pub lasso_max_iterations: usize,
    pub lasso_tolerance: f64,
    /// Columns left out of the feature matrix besides the target.
    pub excluded_features: Vec<String>,
    pub target: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            test_fraction: 0.2,
            seed: 42,
            cv_folds: 10,
            alpha_grid: AlphaGridConfig::default(),
            lasso_max_iterations: DEFAULT_LASSO_MAX_ITERATIONS,
            lasso_tolerance: DEFAULT_LASSO_TOLERANCE,
            excluded_features: vec![DENSITY_COLUMN.to_string(), PH_COLUMN.to_string()],
            target: QUALITY_COLUMN.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| {
            Err(ConfigError::InvalidValue { field, reason })
        };

        if !(self.iqr_multiplier.is_finite() && self.iqr_multiplier > 0.0) {
            return invalid(
                "iqr_multiplier",
                format!("must be finite and positive, got {}", self.iqr_multiplier),
            );
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return invalid(
                "test_fraction",
                format!("must lie strictly between 0 and 1, got {}", self.test_fraction),
            );
        }
        if self.cv_folds < 2 {
            return invalid("cv_folds", format!("must be at least 2, got {}", self.cv_folds));
        }
        let grid = &self.alpha_grid;
        if grid.points == 0 {
            return invalid("alpha_grid.points", "must be at least 1".to_string());
        }
        if !grid.min_exponent.is_finite()
            || !grid.max_exponent.is_finite()
            || grid.min_exponent > grid.max_exponent
        {
            return invalid(
                "alpha_grid",
                format!(
                    "exponents must be finite with min <= max, got [{}, {}]",
                    grid.min_exponent, grid.max_exponent
                ),
            );
        }
        if self.lasso_max_iterations == 0 {
            return invalid("lasso_max_iterations", "must be at least 1".to_string());
        }
        if !(self.lasso_tolerance.is_finite() && self.lasso_tolerance > 0.0) {
            return invalid(
                "lasso_tolerance",
                format!("must be finite and positive, got {}", self.lasso_tolerance),
            );
        }
        if self.excluded_features.iter().any(|c| c == &self.target) {
            return invalid(
                "excluded_features",
                format!("must not list the target column '{}'", self.target),
            );
        }
        Ok(())
    }

    /// The regularization strengths searched for ridge and lasso, ascending.
    pub fn alphas(&self) -> Vec<f64> {
        log_spaced_grid(
            self.alpha_grid.min_exponent,
            self.alpha_grid.max_exponent,
            self.alpha_grid.points,
        )
    }

    pub fn lasso_settings(&self) -> LassoSettings {
        LassoSettings {
            max_iterations: self.lasso_max_iterations,
            tolerance: self.lasso_tolerance,
        }
    }
}

/// Reads a TOML configuration file and validates it.
pub fn load_config(path: &str) -> Result<PipelineConfig, ConfigError> {
    let toml_string = fs::read_to_string(path)?;
    let config: PipelineConfig = toml::from_str(&toml_string)?;
    config.validate()?;
    log::debug!("Loaded pipeline configuration from {path}: {config:?}");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cv_folds, 10);
        assert_eq!(config.seed, 42);
        assert_eq!(config.excluded_features, vec!["density", "pH"]);
        assert_eq!(config.lasso_settings(), LassoSettings::default());
        let alphas = config.alphas();
        assert_eq!(alphas.len(), 20);
        assert_eq!(alphas[19], 1000.0);
    }

    #[test]
    fn test_partial_file_overrides_only_named_keys() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cv_folds = 5\n\n[alpha_grid]\npoints = 7").unwrap();
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.cv_folds, 5);
        assert_eq!(config.alpha_grid.points, 7);
        assert_eq!(config.alpha_grid.min_exponent, -3.0);
        assert_eq!(config.test_fraction, 0.2);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = PipelineConfig::default();
        config.test_fraction = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "test_fraction",
                ..
            })
        ));

        let mut config = PipelineConfig::default();
        config.cv_folds = 1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.excluded_features.push("quality".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "folds = 5").unwrap();
        assert!(matches!(
            load_config(file.path().to_str().unwrap()),
            Err(ConfigError::TomlParseError(_))
        ));
    }
}
