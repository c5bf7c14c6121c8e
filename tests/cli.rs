use std::fs;
use std::process::Command;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

const HEADER: &str = "fixed acidity,volatile acidity,citric acid,residual sugar,chlorides,free sulfur dioxide,total sulfur dioxide,density,pH,sulphates,alcohol,quality,alcohol_level";

fn write_training_csv(path: &std::path::Path, n: usize) {
    let mut rng = StdRng::seed_from_u64(99);
    let mut lines = vec![HEADER.to_string()];
    for _ in 0..n {
        let alcohol: f64 = rng.gen_range(9.0..13.0);
        let sulphates: f64 = rng.gen_range(0.45..0.85);
        let quality = (5.6 + 0.6 * (alcohol - 11.0) + 2.0 * (sulphates - 0.65)
            + rng.gen_range(-0.5..0.5))
        .round()
        .clamp(3.0, 8.0);
        lines.push(format!(
            "{:.2},{:.3},{:.2},{:.2},{:.3},{:.1},{:.1},{:.5},{:.2},{:.2},{:.2},{},Medium",
            rng.gen_range(6.0..10.0),
            rng.gen_range(0.3..0.9),
            rng.gen_range(0.0..0.5),
            rng.gen_range(1.5..3.0),
            rng.gen_range(0.06..0.10),
            rng.gen_range(5.0..30.0),
            rng.gen_range(20.0..80.0),
            rng.gen_range(0.995..0.999),
            rng.gen_range(3.1..3.6),
            sulphates,
            alcohol,
            quality
        ));
    }
    fs::write(path, lines.join("\n")).expect("write training data");
}

#[test]
fn cli_train_predict_and_infer() {
    let tmp = tempdir().expect("temporary directory");
    let training_path = tmp.path().join("wines.csv");
    write_training_csv(&training_path, 200);

    let exe = env!("CARGO_BIN_EXE_vinometry");
    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "train",
            training_path.to_str().expect("path str"),
            "--report",
            "report.toml",
        ])
        .status()
        .expect("run vinometry train");
    assert!(status.success(), "train exited with status {status:?}");
    assert!(tmp.path().join("vinometry.model.toml").exists());
    let report = fs::read_to_string(tmp.path().join("report.toml")).expect("read report");
    assert!(report.contains("production_family = \"Ridge\""));

    let output = Command::new(exe)
        .current_dir(tmp.path())
        .args(["predict", "--alcohol", "12.5", "--sulphates", "0.8"])
        .output()
        .expect("run vinometry predict");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Quality label:"), "unexpected output: {stdout}");

    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args(["infer", training_path.to_str().expect("path str")])
        .status()
        .expect("run vinometry infer");
    assert!(status.success());
    let predictions =
        fs::read_to_string(tmp.path().join("predictions.tsv")).expect("read predictions");
    assert_eq!(predictions.lines().count(), 201);
    assert!(predictions.starts_with("row\tpredicted_quality\trounded_quality\tlabel"));
}

#[test]
fn cli_flags_override_config_file() {
    let tmp = tempdir().expect("temporary directory");
    let training_path = tmp.path().join("wines.csv");
    write_training_csv(&training_path, 150);
    fs::write(
        tmp.path().join("pipeline.toml"),
        "cv_folds = 3\nseed = 11\n",
    )
    .expect("write config");

    let status = Command::new(env!("CARGO_BIN_EXE_vinometry"))
        .current_dir(tmp.path())
        .args([
            "train",
            training_path.to_str().expect("path str"),
            "--config",
            "pipeline.toml",
            "--cv-folds",
            "5",
            "--report",
            "report.toml",
        ])
        .status()
        .expect("run vinometry train");
    assert!(status.success(), "train exited with status {status:?}");

    let report = fs::read_to_string(tmp.path().join("report.toml")).expect("read report");
    assert!(report.contains("cv_folds = 5"), "report: {report}");
    assert!(!report.contains("cv_folds = 3"));
    // Settings without a flag still come from the file.
    assert!(report.contains("seed = 11"));
}

#[test]
fn cli_rejects_invalid_override() {
    let tmp = tempdir().expect("temporary directory");
    let training_path = tmp.path().join("wines.csv");
    write_training_csv(&training_path, 60);

    let output = Command::new(env!("CARGO_BIN_EXE_vinometry"))
        .current_dir(tmp.path())
        .args([
            "train",
            training_path.to_str().expect("path str"),
            "--test-fraction",
            "1.5",
        ])
        .output()
        .expect("run vinometry train");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("test_fraction"), "stderr: {stderr}");
    assert!(!tmp.path().join("vinometry.model.toml").exists());
}

#[test]
fn cli_predict_without_model_fails() {
    let tmp = tempdir().expect("temporary directory");
    let output = Command::new(env!("CARGO_BIN_EXE_vinometry"))
        .current_dir(tmp.path())
        .arg("predict")
        .output()
        .expect("run vinometry predict");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Run the training pipeline first"), "stderr: {stderr}");
}
