//! End-to-end pipeline tests: raw CSV in, tracked runs and reports out

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use housing_value::artifact;
use housing_value::config::PipelineConfig;
use housing_value::experiment::{ExperimentStore, RunStatus};
use housing_value::pipeline::{self, INGEST_RUN, PARENT_RUN, SCORE_RUN, TRAIN_RUN};
use housing_value::schema::housing_schema;
use housing_value::storage::{numeric_column, write_csv, StorageEngine};
use housing_value::train::TrainedPipeline;
use housing_value::Error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const OCEAN: [&str; 4] = ["<1H OCEAN", "INLAND", "NEAR BAY", "NEAR OCEAN"];

/// Housing table whose value depends on income and location, with a few
/// missing bedroom counts
fn synthetic_housing(n: usize, seed: u64) -> RecordBatch {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(n); 9];
    let mut ocean = Vec::with_capacity(n);

    for i in 0..n {
        let income: f64 = rng.gen_range(0.5..12.0);
        let households: f64 = rng.gen_range(50.0..1500.0);
        let rooms = households * rng.gen_range(3.0..8.0);
        let category = OCEAN[i % OCEAN.len()];
        let location_premium = if category == "INLAND" { 0.6 } else { 1.0 };
        let value = 40_000.0 * income * location_premium + rng.gen_range(-10_000.0..10_000.0);

        let row = [
            Some(rng.gen_range(-124.0..-114.0)),
            Some(rng.gen_range(32.0..42.0)),
            Some(rng.gen_range(1.0..52.0)),
            Some(rooms),
            (i % 37 != 0).then(|| rooms * rng.gen_range(0.15..0.3)),
            Some(households * rng.gen_range(2.0..4.0)),
            Some(households),
            Some(income),
            Some(value),
        ];
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
        ocean.push(category);
    }

    let mut arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|c| Arc::new(Float64Array::from(c)) as ArrayRef)
        .collect();
    arrays.push(Arc::new(StringArray::from(ocean)));
    RecordBatch::try_new(housing_schema(), arrays).unwrap()
}

fn config_in(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.raw_data = root.join("raw").join("housing.csv");
    config.paths.processed_dir = root.join("processed");
    config.paths.artifacts_dir = root.join("artifacts");
    config.logging.file = None;
    config
}

fn write_raw(config: &PipelineConfig, batch: &RecordBatch) {
    write_csv(&config.paths.raw_data, batch).unwrap();
}

#[test]
fn test_run_all_produces_reports_and_nested_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    write_raw(&config, &synthetic_housing(250, 1));

    let summary = pipeline::run_all(&config).unwrap();

    assert_eq!(summary.ingest.raw_rows, 250);
    assert_eq!(summary.ingest.test_rows, 50);
    assert_eq!(summary.ingest.train_rows, 200);
    assert_eq!(summary.train.report.results.len(), 18);
    assert_eq!(summary.train.report.fits, 90);
    assert!(summary.score.report.rmse().is_finite());
    assert_eq!(summary.score.report.actual().len(), 50);

    let output = StorageEngine::load_csv(
        &summary.score.output_path,
        summary.score.report.to_record_batch().unwrap().schema(),
    )
    .unwrap();
    assert_eq!(output.num_rows(), 50);

    let store = ExperimentStore::load_json(config.paths.tracking_store()).unwrap();
    let parent = store.get_run(&summary.parent_run_id).unwrap();
    assert_eq!(parent.run_name(), PARENT_RUN);
    assert_eq!(parent.status(), RunStatus::Success);

    let children = store.get_child_runs(&summary.parent_run_id);
    let names: Vec<&str> = children.iter().map(|r| r.run_name()).collect();
    assert_eq!(names, vec![INGEST_RUN, TRAIN_RUN, SCORE_RUN]);
    assert!(children.iter().all(|r| r.status() == RunStatus::Success));

    assert_eq!(children[0].param("split_size"), Some("0.2"));
    assert_eq!(
        children[1].param("best_estimator"),
        Some(summary.train.report.pipeline.best_params().to_string().as_str())
    );
    assert_eq!(
        store.latest_metric(children[2].run_id(), "rmse"),
        Some(summary.score.report.rmse())
    );
    let mut train_artifacts: Vec<&str> = store
        .get_artifacts_for_run(children[1].run_id())
        .iter()
        .map(|a| a.key())
        .collect();
    train_artifacts.sort_unstable();
    assert_eq!(train_artifacts, vec!["model", "pipeline", "preparer"]);
    assert_eq!(store.get_artifacts_for_run(children[2].run_id()).len(), 1);
}

#[test]
fn test_run_all_is_deterministic() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let raw = synthetic_housing(120, 3);

    let mut rmse = Vec::new();
    for dir in [&dir_a, &dir_b] {
        let mut config = config_in(dir.path());
        config.split.test_size = 0.25;
        write_raw(&config, &raw);
        rmse.push(pipeline::run_all(&config).unwrap().score.report.rmse());
    }
    assert_eq!(rmse[0].to_bits(), rmse[1].to_bits());
}

#[test]
fn test_stages_run_separately() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    write_raw(&config, &synthetic_housing(100, 5));

    let ingest = pipeline::run_ingest(&config).unwrap();
    let train = StorageEngine::load_csv(&ingest.train_path, housing_schema()).unwrap();
    assert_eq!(train.num_rows(), 80);

    let trained = pipeline::run_train(&config).unwrap();
    let stored: TrainedPipeline = artifact::load(&trained.artifact.path).unwrap();
    assert_eq!(stored, trained.report.pipeline);

    let scored = pipeline::run_score(&config).unwrap();
    let table = StorageEngine::load_csv(config.paths.test_csv(), housing_schema())
        .unwrap()
        .table()
        .unwrap();
    let labels: Vec<f64> = numeric_column(&table, "median_house_value")
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(scored.report.actual(), labels.as_slice());
}

#[test]
fn test_score_from_preparer_and_model_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    write_raw(&config, &synthetic_housing(100, 6));
    pipeline::run_ingest(&config).unwrap();
    let trained = pipeline::run_train(&config).unwrap();
    let bundled = pipeline::run_score(&config).unwrap();

    std::fs::remove_file(&trained.artifact.path).unwrap();
    config.paths.output_dir = Some(dir.path().join("reports"));
    let from_parts = pipeline::run_score(&config).unwrap();

    assert_eq!(from_parts.output_path, dir.path().join("reports").join("output.csv"));
    assert!(from_parts.output_path.exists());
    assert_eq!(from_parts.report.rmse().to_bits(), bundled.report.rmse().to_bits());

    std::fs::remove_file(&trained.model_artifact.path).unwrap();
    assert!(matches!(
        pipeline::run_score(&config),
        Err(Error::MissingArtifact { .. })
    ));
}

#[test]
fn test_score_without_training_is_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    write_raw(&config, &synthetic_housing(60, 2));
    pipeline::run_ingest(&config).unwrap();

    assert!(matches!(
        pipeline::run_score(&config),
        Err(Error::MissingArtifact { .. })
    ));
}

#[test]
fn test_raw_header_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    std::fs::create_dir_all(config.paths.raw_data.parent().unwrap()).unwrap();
    std::fs::write(&config.paths.raw_data, "a,b,c\n1,2,3\n").unwrap();

    assert!(matches!(
        pipeline::run_ingest(&config),
        Err(Error::SchemaMismatch(_))
    ));
}

#[test]
fn test_failed_stage_marks_runs_failed() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    // constant label: training cannot fit
    let raw = synthetic_housing(60, 4);
    let mut columns = raw.columns().to_vec();
    columns[8] = Arc::new(Float64Array::from(vec![100_000.0; 60]));
    let raw = RecordBatch::try_new(raw.schema(), columns).unwrap();
    write_raw(&config, &raw);

    let result = pipeline::run_all(&config);
    assert!(matches!(result, Err(Error::FitFailure(_))));

    let store = ExperimentStore::load_json(config.paths.tracking_store()).unwrap();
    let experiment = store.find_experiment(pipeline::EXPERIMENT_NAME).unwrap();
    let runs = store.get_runs_for_experiment(experiment.experiment_id());
    let parent = runs.iter().find(|r| r.run_name() == PARENT_RUN).unwrap();
    assert_eq!(parent.status(), RunStatus::Failed);

    let children = store.get_child_runs(parent.run_id());
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].status(), RunStatus::Success);
    assert_eq!(children[1].run_name(), TRAIN_RUN);
    assert_eq!(children[1].status(), RunStatus::Failed);
    assert!(children[1].error().is_some_and(|e| e.contains("constant")));
}
