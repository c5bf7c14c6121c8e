#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use itertools::Itertools;
use std::path::PathBuf;
use std::process;

use vinometry::artifact::{DEFAULT_ARTIFACT_PATH, FileArtifactStore};
use vinometry::config::{PipelineConfig, load_config};
use vinometry::data::{QUALITY_COLUMN, load_dataset, load_prediction_records};
use vinometry::describe::{DatasetDescription, describe};
use vinometry::pipeline::{TrainingReport, run_training_pipeline};
use vinometry::predict::{Predictor, WineSample, write_predictions};

#[derive(Args)]
pub struct DescribeArgs {
    /// Path to the wine CSV file
    pub data: String,
}

#[derive(Args)]
pub struct TrainArgs {
    /// Path to the wine CSV file with the physicochemical columns and quality
    pub training_data: String,

    /// Where the standardizer and production model are written
    #[arg(long, default_value = DEFAULT_ARTIFACT_PATH)]
    pub artifacts: PathBuf,

    /// Optional TOML file overriding pipeline settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Also write the full training report as TOML
    #[arg(long, value_name = "FILE")]
    pub report: Option<String>,

    /// Seed of the train/test shuffle
    #[arg(long)]
    pub seed: Option<u64>,

    /// Share of rows held out for testing, in (0, 1)
    #[arg(long)]
    pub test_fraction: Option<f64>,

    /// Number of cross-validation folds
    #[arg(long)]
    pub cv_folds: Option<usize>,

    /// IQR multiplier of the outlier fences
    #[arg(long)]
    pub iqr_multiplier: Option<f64>,

    /// Coordinate descent sweeps allowed per lasso fit
    #[arg(long)]
    pub lasso_max_iterations: Option<usize>,

    /// Duality gap tolerance of the lasso, relative to the target's sum of squares
    #[arg(long)]
    pub lasso_tolerance: Option<f64>,
}

impl TrainArgs {
    /// Flags given on the command line win over the file and the defaults.
    fn apply_overrides(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(fraction) = self.test_fraction {
            config.test_fraction = fraction;
        }
        if let Some(folds) = self.cv_folds {
            config.cv_folds = folds;
        }
        if let Some(multiplier) = self.iqr_multiplier {
            config.iqr_multiplier = multiplier;
        }
        if let Some(iterations) = self.lasso_max_iterations {
            config.lasso_max_iterations = iterations;
        }
        if let Some(tolerance) = self.lasso_tolerance {
            config.lasso_tolerance = tolerance;
        }
        config
    }
}

/// One wine to score. Defaults describe the first sample of the red wine dataset.
#[derive(Args)]
pub struct SampleArgs {
    #[arg(long, default_value_t = 7.4)]
    pub fixed_acidity: f64,
    #[arg(long, default_value_t = 0.7)]
    pub volatile_acidity: f64,
    #[arg(long, default_value_t = 0.0)]
    pub citric_acid: f64,
    #[arg(long, default_value_t = 1.9)]
    pub residual_sugar: f64,
    #[arg(long, default_value_t = 0.076)]
    pub chlorides: f64,
    #[arg(long, default_value_t = 11.0)]
    pub free_sulfur_dioxide: f64,
    #[arg(long, default_value_t = 34.0)]
    pub total_sulfur_dioxide: f64,
    #[arg(long, default_value_t = 0.56)]
    pub sulphates: f64,
    #[arg(long, default_value_t = 9.4)]
    pub alcohol: f64,
}

impl From<SampleArgs> for WineSample {
    fn from(args: SampleArgs) -> Self {
        WineSample {
            fixed_acidity: args.fixed_acidity,
            volatile_acidity: args.volatile_acidity,
            citric_acid: args.citric_acid,
            residual_sugar: args.residual_sugar,
            chlorides: args.chlorides,
            free_sulfur_dioxide: args.free_sulfur_dioxide,
            total_sulfur_dioxide: args.total_sulfur_dioxide,
            sulphates: args.sulphates,
            alcohol: args.alcohol,
        }
    }
}

#[derive(Args)]
pub struct PredictArgs {
    #[arg(long, default_value = DEFAULT_ARTIFACT_PATH)]
    pub artifacts: PathBuf,

    #[command(flatten)]
    pub sample: SampleArgs,
}

#[derive(Args)]
pub struct InferArgs {
    /// Path to a CSV of records carrying the model's feature columns
    pub data: String,

    #[arg(long, default_value = DEFAULT_ARTIFACT_PATH)]
    pub artifacts: PathBuf,

    #[arg(long, default_value = "predictions.tsv")]
    pub output: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "vinometry",
    version,
    about = "Wine quality regression from physicochemical measurements",
    long_about = "Filters outliers, fits linear, ridge and lasso models with cross-validated \
                 regularization, and predicts the quality score of new wines."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the dataset
    #[command(about = "Print column statistics, quality distribution and correlations")]
    Describe(DescribeArgs),

    /// Train the models and persist the production model
    #[command(about = "Train OLS, ridge and lasso models (outputs: vinometry.model.toml)")]
    Train(TrainArgs),

    /// Predict the quality of one wine
    #[command(about = "Predict the quality of a single wine")]
    Predict(PredictArgs),

    /// Predict every record of a CSV file
    #[command(about = "Apply the trained model to a CSV file (outputs: predictions.tsv)")]
    Infer(InferArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Describe(args)) => run_describe(args),
        Some(Commands::Train(args)) => train(args),
        Some(Commands::Predict(args)) => predict(args),
        Some(Commands::Infer(args)) => infer(args),
        None => Cli::command()
            .print_help()
            .map(|_| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

pub fn run_describe(args: DescribeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let table = load_dataset(&args.data)?;
    let description = describe(&table)?;
    print_description(&description);
    Ok(())
}

pub fn train(args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => {
            println!("Loading pipeline configuration from: {path}");
            load_config(path)?
        }
        None => PipelineConfig::default(),
    };
    let config = args.apply_overrides(config);

    println!("Loading training data from: {}", args.training_data);
    let table = load_dataset(&args.training_data)?;

    let mut store = FileArtifactStore::new(&args.artifacts);
    let report = run_training_pipeline(&table, &config, &mut store)?;
    print_report(&report);
    println!("Model saved to: {}", store.path().display());

    if let Some(path) = &args.report {
        report.save(path)?;
        println!("Training report saved to: {path}");
    }
    Ok(())
}

pub fn predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let predictor = Predictor::from_store(&FileArtifactStore::new(&args.artifacts))?;
    let sample = WineSample::from(args.sample);
    let prediction = predictor.predict_sample(&sample)?;

    println!("Model: {}", predictor.model().family);
    println!("Predicted quality score: {:.2}", prediction.score);
    println!("Rounded quality: {}", prediction.rounded);
    println!("Quality label: {}", prediction.label);
    Ok(())
}

pub fn infer(args: InferArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading model from: {}", args.artifacts.display());
    let predictor = Predictor::from_store(&FileArtifactStore::new(&args.artifacts))?;
    println!(
        "Model expects features: {}",
        predictor.feature_names().iter().join(", ")
    );

    println!("Loading records from: {}", args.data);
    let records = load_prediction_records(&args.data, predictor.feature_names())?;
    let predictions = predictor.predict_matrix(records.view())?;
    write_predictions(&args.output, &predictions)?;
    println!("Predictions saved to: {}", args.output.display());
    Ok(())
}

fn print_description(description: &DatasetDescription) {
    println!("Samples: {}", description.n_rows);
    println!();
    println!(
        "{:<22} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
    for s in &description.summaries {
        println!(
            "{:<22} {:>6} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
            s.column, s.count, s.mean, s.std, s.min, s.q1, s.median, s.q3, s.max
        );
    }

    println!();
    println!(
        "Quality distribution: {}",
        description
            .quality_counts
            .iter()
            .map(|(score, count)| format!("{score}: {count}"))
            .join(", ")
    );

    println!();
    println!("Mean quality by alcohol level:");
    for band in &description.alcohol_bands {
        let mean = band
            .mean_quality
            .map_or_else(|| "-".to_string(), |m| format!("{m:.3}"));
        println!(
            "  {:<10} ({:>4}, {:>4}]  n = {:>5}  mean = {mean}",
            band.label, band.lower, band.upper, band.count
        );
    }

    let corr = &description.correlations;
    println!();
    println!("Correlation with {QUALITY_COLUMN}:");
    let ranked = corr
        .columns
        .iter()
        .filter(|c| c.as_str() != QUALITY_COLUMN)
        .filter_map(|c| corr.get(c, QUALITY_COLUMN).map(|r| (c, r)))
        .sorted_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    for (column, r) in ranked {
        println!("  {column:<22} {r:>7.3}");
    }
}

fn print_report(report: &TrainingReport) {
    println!(
        "Rows before outlier filtering: {}, after: {} ({} removed)",
        report.rows_before_filter,
        report.rows_after_filter,
        report.rows_before_filter - report.rows_after_filter
    );
    println!(
        "Train rows: {}, test rows: {}",
        report.train_rows, report.test_rows
    );

    println!();
    println!("Variance inflation factors:");
    for entry in &report.vif {
        println!("  {:<22} {:>10.3}", entry.column, entry.vif);
    }

    println!();
    println!(
        "{:<22} {}",
        "feature",
        report
            .models
            .iter()
            .map(|m| format!("{:>18}", m.family.to_string()))
            .join(" ")
    );
    for (j, feature) in report.feature_names.iter().enumerate() {
        println!(
            "{:<22} {}",
            feature,
            report
                .models
                .iter()
                .map(|m| format!("{:>18.6}", m.coefficients[j].coefficient))
                .join(" ")
        );
    }
    println!(
        "{:<22} {}",
        "(intercept)",
        report
            .models
            .iter()
            .map(|m| format!("{:>18.6}", m.intercept))
            .join(" ")
    );

    println!();
    println!(
        "{:<18} {:>12} {:>8} {:>8} {:>8} {:>8}",
        "model", "alpha", "MAE", "MSE", "RMSE", "R²"
    );
    for m in &report.models {
        let alpha = m.alpha.map_or_else(|| "-".to_string(), |a| format!("{a:.4e}"));
        println!(
            "{:<18} {:>12} {:>8.4} {:>8.4} {:>8.4} {:>8.4}",
            m.family.to_string(),
            alpha,
            m.metrics.mae,
            m.metrics.mse,
            m.metrics.rmse,
            m.metrics.r2
        );
        if !m.converged {
            println!("  warning: {} did not converge at the selected alpha", m.family);
        }
    }
    println!();
    println!("Production model: {}", report.production_family);
}
