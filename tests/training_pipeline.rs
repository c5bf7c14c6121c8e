use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;

use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use vinometry::artifact::{ArtifactStore, FileArtifactStore};
use vinometry::config::PipelineConfig;
use vinometry::data::{load_dataset, load_prediction_records};
use vinometry::describe::describe;
use vinometry::model::ModelFamily;
use vinometry::pipeline::run_training_pipeline;
use vinometry::predict::{PredictionError, Predictor, WineSample};

const HEADER: &str = "fixed acidity,volatile acidity,citric acid,residual sugar,chlorides,free sulfur dioxide,total sulfur dioxide,density,pH,sulphates,alcohol,quality,alcohol_level";

/// Red-wine-like measurements whose quality rises with alcohol and sulphates
/// and falls with volatile acidity.
fn synthetic_csv(n: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut csv = String::from(HEADER);
    for _ in 0..n {
        let fixed_acidity = rng.gen_range(6.0..10.0);
        let volatile_acidity = rng.gen_range(0.3..0.9);
        let citric_acid = rng.gen_range(0.0..0.5);
        let residual_sugar = rng.gen_range(1.5..3.0);
        let chlorides = rng.gen_range(0.06..0.10);
        let free_so2 = rng.gen_range(5.0..30.0);
        let total_so2 = free_so2 + rng.gen_range(10.0..60.0);
        let density = rng.gen_range(0.995..0.999);
        let ph = rng.gen_range(3.1..3.6);
        let sulphates = rng.gen_range(0.45..0.85);
        let alcohol: f64 = rng.gen_range(9.0..13.0);
        let score = 5.6 + 0.6 * (alcohol - 11.0) + 2.0 * (sulphates - 0.65)
            - 2.0 * (volatile_acidity - 0.6)
            + rng.gen_range(-0.5..0.5);
        let quality = score.round().clamp(3.0, 8.0);
        let level = if alcohol <= 11.0 { "Medium" } else { "High" };
        write!(
            csv,
            "\n{fixed_acidity:.2},{volatile_acidity:.3},{citric_acid:.2},{residual_sugar:.2},{chlorides:.3},{free_so2:.1},{total_so2:.1},{density:.5},{ph:.2},{sulphates:.2},{alcohol:.2},{quality},{level}"
        )
        .unwrap();
    }
    csv
}

#[test]
fn training_persists_a_bundle_that_prediction_can_use() {
    let tmp = tempdir().unwrap();
    let data_path = tmp.path().join("winequality-red.csv");
    fs::write(&data_path, synthetic_csv(400, 1)).unwrap();

    let table = load_dataset(data_path.to_str().unwrap()).unwrap();
    assert_eq!(table.n_columns(), 12);

    let mut store = FileArtifactStore::new(tmp.path().join("model.toml"));
    let report = run_training_pipeline(&table, &PipelineConfig::default(), &mut store).unwrap();

    assert_eq!(report.rows_before_filter, 400);
    assert_eq!(
        report.feature_names,
        vec![
            "fixed acidity",
            "volatile acidity",
            "citric acid",
            "residual sugar",
            "chlorides",
            "free sulfur dioxide",
            "total sulfur dioxide",
            "sulphates",
            "alcohol"
        ]
    );
    for model in &report.models {
        assert!(model.metrics.r2 > 0.3, "{} R² = {}", model.family, model.metrics.r2);
    }

    let bundle = store.load().unwrap();
    assert_eq!(bundle.model.family, ModelFamily::Ridge);
    let ridge = report.model(ModelFamily::Ridge).unwrap();
    assert_eq!(bundle.model.alpha, ridge.alpha);

    let predictor = Predictor::from_store(&store).unwrap();
    let prediction = predictor.predict_sample(&WineSample::default()).unwrap();
    assert!(prediction.score.is_finite());
    assert_eq!(prediction.rounded, prediction.score.round() as i64);

    // The record map's own order is irrelevant; only names matter.
    let mut record: BTreeMap<String, f64> = WineSample::default().to_record();
    let by_map = predictor.predict_record(&record).unwrap();
    assert_abs_diff_eq!(by_map.score, prediction.score, epsilon = 1e-12);

    record.insert("density".to_string(), 0.997);
    assert!(matches!(
        predictor.predict_record(&record),
        Err(PredictionError::UnexpectedFeature(_))
    ));
}

#[test]
fn batch_records_are_read_in_stored_feature_order() {
    let tmp = tempdir().unwrap();
    let data_path = tmp.path().join("wines.csv");
    fs::write(&data_path, synthetic_csv(250, 2)).unwrap();
    let table = load_dataset(data_path.to_str().unwrap()).unwrap();

    let mut store = FileArtifactStore::new(tmp.path().join("model.toml"));
    run_training_pipeline(&table, &PipelineConfig::default(), &mut store).unwrap();
    let predictor = Predictor::from_store(&store).unwrap();

    // Same sample twice, columns shuffled and padded with an unused column.
    let sample = WineSample::default().to_record();
    let mut names: Vec<&String> = sample.keys().collect();
    names.reverse();
    let mut csv = names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(",");
    csv.push_str(",density");
    for _ in 0..2 {
        let row: Vec<String> = names.iter().map(|n| sample[*n].to_string()).collect();
        csv.push_str(&format!("\n{},0.9978", row.join(",")));
    }
    let records_path = tmp.path().join("records.csv");
    fs::write(&records_path, csv).unwrap();

    let records =
        load_prediction_records(records_path.to_str().unwrap(), predictor.feature_names()).unwrap();
    let predictions = predictor.predict_matrix(records.view()).unwrap();
    let single = predictor.predict_sample(&WineSample::default()).unwrap();

    assert_eq!(predictions.len(), 2);
    for p in &predictions {
        assert_abs_diff_eq!(p.score, single.score, epsilon = 1e-9);
        assert_eq!(p.label, single.label);
    }
}

#[test]
fn prediction_without_training_is_a_state_error() {
    let tmp = tempdir().unwrap();
    let store = FileArtifactStore::new(tmp.path().join("missing.toml"));
    assert!(matches!(
        Predictor::from_store(&store),
        Err(PredictionError::NoArtifacts(_))
    ));
}

#[test]
fn describe_reports_every_numeric_column() {
    let tmp = tempdir().unwrap();
    let data_path = tmp.path().join("wines.csv");
    fs::write(&data_path, synthetic_csv(120, 3)).unwrap();
    let table = load_dataset(data_path.to_str().unwrap()).unwrap();

    let description = describe(&table).unwrap();
    assert_eq!(description.n_rows, 120);
    assert_eq!(description.summaries.len(), 12);
    assert_eq!(description.quality_counts.values().sum::<usize>(), 120);
    // Synthetic alcohol lies in [9, 13), so the top band is empty.
    assert_eq!(description.alcohol_bands[3].mean_quality, None);
    let r = description.correlations.get("alcohol", "quality").unwrap();
    assert!(r > 0.3);
}
