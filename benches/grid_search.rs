// Cross-validated alpha search on a wine-sized problem: ~1,100 training rows,
// nine standardized features, 20 alphas and 10 folds.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vinometry::estimate::{LassoSettings, Penalty, grid_search, log_spaced_grid};
use vinometry::split::KFold;

const N_SAMPLES: usize = 1_100;
const N_FEATURES: usize = 9;

fn synthetic_problem() -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(42);
    let x = Array2::from_shape_fn((N_SAMPLES, N_FEATURES), |_| rng.gen_range(-2.0..2.0));
    let beta: Vec<f64> = (0..N_FEATURES).map(|j| 0.3 - 0.07 * j as f64).collect();
    let y = Array1::from_shape_fn(N_SAMPLES, |i| {
        5.6 + (0..N_FEATURES).map(|j| beta[j] * x[[i, j]]).sum::<f64>()
            + rng.gen_range(-0.6..0.6)
    });
    (x, y)
}

fn bench_grid_search(c: &mut Criterion) {
    let (x, y) = synthetic_problem();
    let alphas = log_spaced_grid(-3.0, 3.0, 20);
    let folds = match KFold::new(10).and_then(|k| k.split(N_SAMPLES)) {
        Ok(folds) => folds,
        Err(e) => panic!("fold construction failed: {e}"),
    };

    let mut group = c.benchmark_group("grid_search");
    group.sample_size(10);
    for (name, penalty) in [
        ("ridge", Penalty::Ridge),
        ("lasso", Penalty::Lasso(LassoSettings::default())),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &penalty, |b, &penalty| {
            b.iter(|| {
                grid_search(
                    black_box(x.view()),
                    black_box(y.view()),
                    penalty,
                    &alphas,
                    &folds,
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_grid_search);
criterion_main!(benches);
