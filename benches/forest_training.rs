//! Model training benchmarks
//!
//! - Single forest fit across estimator counts
//! - Forest prediction
//! - One grid-search candidate (5 fold fits)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use housing_value::config::SearchConfig;
use housing_value::model::{FeatureMatrix, ForestParams, GridSearch, ParamGrid, RandomForestRegressor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Feature matrix shaped like the prepared housing table (16 columns)
fn create_training_data(rows: usize) -> (FeatureMatrix, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(42);
    let names: Vec<String> = (0..16).map(|i| format!("f{i}")).collect();
    let data: Vec<Vec<f64>> = (0..rows)
        .map(|_| (0..16).map(|_| rng.gen_range(0.0..100.0)).collect())
        .collect();
    let labels = data
        .iter()
        .map(|row| row[0] * 3.0 + row[5] * row[7] / 10.0 + rng.gen_range(-5.0..5.0))
        .collect();
    (FeatureMatrix::from_rows(names, &data).unwrap(), labels)
}

fn bench_forest_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_fit");
    group.sample_size(10);
    let (x, y) = create_training_data(2_000);

    for n_estimators in [3, 10, 30] {
        group.bench_with_input(
            BenchmarkId::from_parameter(n_estimators),
            &n_estimators,
            |b, &n| {
                b.iter(|| {
                    RandomForestRegressor::fit(ForestParams::new(n, 6), 42, black_box(&x), &y)
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_forest_predict(c: &mut Criterion) {
    let (x, y) = create_training_data(2_000);
    let forest = RandomForestRegressor::fit(ForestParams::new(30, 8), 42, &x, &y).unwrap();

    c.bench_function("forest_predict_2000_rows", |b| {
        b.iter(|| forest.predict(black_box(&x)).unwrap());
    });
}

fn bench_grid_candidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_search");
    group.sample_size(10);
    let (x, y) = create_training_data(1_000);
    let search = GridSearch::new(
        ParamGrid::product(&[10], &[4], true),
        &SearchConfig::default(),
    );

    group.bench_function("one_candidate_5_folds", |b| {
        b.iter(|| search.fit(black_box(&x), &y).unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_forest_fit,
    bench_forest_predict,
    bench_grid_candidate
);
criterion_main!(benches);
