//! Pipeline stages and the tracked end-to-end run
//!
//! ```text
//! PARENT_RUN
//!   ├── INGEST_DATA   raw.csv ─► train.csv, test.csv
//!   ├── TRAIN_MODEL   train.csv ─► pipe.json, preparer.json, model.json
//!   └── SCORE_MODEL   pipe.json (or preparer.json + model.json)
//!                     + test.csv ─► output.csv
//! ```
//!
//! Each stage can also run on its own; stages communicate only through
//! the files above.

use std::path::PathBuf;

use uuid::Uuid;

use crate::artifact::{self, SavedArtifact};
use crate::config::PipelineConfig;
use crate::experiment::{ArtifactRecord, ExperimentRecord, ExperimentStore, RunRecord, RunStatus};
use crate::schema::housing_schema;
use crate::score::{ScoreReport, Scorer};
use crate::storage::{write_csv, StorageEngine};
use crate::stratify::{label_income_category, StratifiedSplitter};
use crate::train::{TrainedPipeline, Trainer, TrainingReport};
use crate::{Error, Result};

/// Experiment name all tracked runs are filed under
pub const EXPERIMENT_NAME: &str = "housing-value";
/// Name of the end-to-end run
pub const PARENT_RUN: &str = "PARENT_RUN";
/// Name of the ingest stage run
pub const INGEST_RUN: &str = "INGEST_DATA";
/// Name of the training stage run
pub const TRAIN_RUN: &str = "TRAIN_MODEL";
/// Name of the scoring stage run
pub const SCORE_RUN: &str = "SCORE_MODEL";

/// Files and row counts written by the ingest stage
#[derive(Debug, Clone)]
pub struct IngestSummary {
    /// Rows in the raw table
    pub raw_rows: usize,
    /// Rows written to the train split
    pub train_rows: usize,
    /// Rows written to the test split
    pub test_rows: usize,
    /// Train split location
    pub train_path: PathBuf,
    /// Test split location
    pub test_path: PathBuf,
}

/// Training outcome and the persisted artifacts
#[derive(Debug)]
pub struct TrainSummary {
    /// Search results and the fitted pipeline
    pub report: TrainingReport,
    /// Where the pipeline artifact was written
    pub artifact: SavedArtifact,
    /// Where the standalone preparer artifact was written
    pub preparer_artifact: SavedArtifact,
    /// Where the standalone model artifact was written
    pub model_artifact: SavedArtifact,
}

/// Scoring outcome and the written report
#[derive(Debug, Clone)]
pub struct ScoreSummary {
    /// Actual/predicted pairs and RMSE
    pub report: ScoreReport,
    /// Score report location
    pub output_path: PathBuf,
}

/// Everything an end-to-end run produced
#[derive(Debug)]
pub struct PipelineSummary {
    /// ID of the tracked parent run
    pub parent_run_id: String,
    /// Ingest stage outcome
    pub ingest: IngestSummary,
    /// Training stage outcome
    pub train: TrainSummary,
    /// Scoring stage outcome
    pub score: ScoreSummary,
}

/// Load the raw table, stratify it and write the train and test splits
///
/// # Errors
/// - `SchemaMismatch` if the raw header is not the housing schema
/// - `InvalidSplitConfiguration` from the splitter
/// - IO/Arrow errors reading or writing CSV
pub fn run_ingest(config: &PipelineConfig) -> Result<IngestSummary> {
    let paths = &config.paths;
    tracing::debug!(raw = %paths.raw_data.display(), "Ingesting raw data");

    let raw = StorageEngine::load_csv(&paths.raw_data, housing_schema())?.table()?;
    let labelled = label_income_category(&raw, &config.split.stratify_column)?;
    let split = StratifiedSplitter::new(config.split.clone()).split(&labelled)?;

    let train_path = paths.train_csv();
    let test_path = paths.test_csv();
    write_csv(&train_path, &split.train)?;
    write_csv(&test_path, &split.test)?;

    Ok(IngestSummary {
        raw_rows: raw.num_rows(),
        train_rows: split.train.num_rows(),
        test_rows: split.test.num_rows(),
        train_path,
        test_path,
    })
}

/// Fit the preparer and search the forest grid on the train split, then
/// persist the winning pipeline, plus its preparer and model on their own
///
/// # Errors
/// - `SchemaMismatch` if `train.csv` is not in the housing schema
/// - `FitFailure` on degenerate training data
/// - IO errors reading the split or writing the artifact
pub fn run_train(config: &PipelineConfig) -> Result<TrainSummary> {
    let train_path = config.paths.train_csv();
    tracing::debug!(train = %train_path.display(), "Training pipeline");

    let table = StorageEngine::load_csv(&train_path, housing_schema())?.table()?;
    let report = Trainer::from_config(config).train(&table)?;
    let artifact = artifact::save(config.paths.pipeline_artifact(), &report.pipeline)?;
    let preparer_artifact =
        artifact::save(config.paths.preparer_artifact(), report.pipeline.preparer())?;
    let model_artifact = artifact::save(config.paths.model_artifact(), report.pipeline.model())?;

    tracing::info!(
        best = %report.pipeline.best_params(),
        cv_rmse = report.best_cv_rmse,
        "Training stage complete"
    );
    Ok(TrainSummary {
        report,
        artifact,
        preparer_artifact,
        model_artifact,
    })
}

/// Replay the persisted pipeline on the test split and write the report.
///
/// When `pipe.json` is unavailable but both the preparer and model
/// artifacts exist, the pipeline is rebuilt from that pair.
///
/// # Errors
/// - `MissingArtifact` if no usable pipeline artifact is found
/// - `SchemaMismatch` if the artifact is stale or the split lacks a column
/// - IO errors reading the split or writing the report
pub fn run_score(config: &PipelineConfig) -> Result<ScoreSummary> {
    let paths = &config.paths;
    tracing::debug!(test = %paths.test_csv().display(), "Scoring pipeline");

    let pipeline = load_scoring_pipeline(config)?;
    let table = StorageEngine::load_csv(paths.test_csv(), housing_schema())?.table()?;
    let report = Scorer::score(&pipeline, &table)?;

    let output_path = paths.score_report();
    report.write_csv(&output_path)?;
    Ok(ScoreSummary {
        report,
        output_path,
    })
}

fn load_scoring_pipeline(config: &PipelineConfig) -> Result<TrainedPipeline> {
    let paths = &config.paths;
    match artifact::load_pipeline(paths.pipeline_artifact()) {
        Err(Error::MissingArtifact { path, reason })
            if paths.preparer_artifact().exists() && paths.model_artifact().exists() =>
        {
            tracing::warn!(
                path = %path.display(),
                %reason,
                "Pipeline artifact unavailable, scoring from preparer and model artifacts"
            );
            artifact::load_pipeline_parts(
                paths.preparer_artifact(),
                paths.model_artifact(),
                &config.features.label_column,
            )
        }
        other => other,
    }
}

/// Run ingest, train and score as nested tracked runs
///
/// The tracking store is loaded from (and saved back to) the configured
/// tracking file. A stage error marks that stage and the parent run
/// `Failed`; the store is still saved before the error is returned.
///
/// # Errors
/// Returns the first stage error, or an error saving the tracking store
pub fn run_all(config: &PipelineConfig) -> Result<PipelineSummary> {
    config.validate()?;

    let tracking_path = config.paths.tracking_store();
    let mut store = ExperimentStore::open(&tracking_path)?;
    let experiment_id = ensure_experiment(&mut store, config)?;

    let parent_id = Uuid::new_v4().to_string();
    store.add_run(
        RunRecord::builder(&parent_id, &experiment_id, PARENT_RUN)
            .param("parent_run", "yes")
            .build(),
    )?;
    store.start_run(&parent_id)?;
    tracing::info!(run_id = %parent_id, "{PARENT_RUN} started");

    let outcome = run_stages(config, &mut store, &experiment_id, &parent_id);
    match &outcome {
        Ok(_) => store.complete_run(&parent_id, RunStatus::Success)?,
        Err(e) => store.fail_run(&parent_id, &e.to_string())?,
    }

    if let Err(save_err) = store.save_json(&tracking_path) {
        if outcome.is_ok() {
            return Err(save_err);
        }
        tracing::warn!(error = %save_err, "Could not persist tracking store");
    }
    outcome
}

fn ensure_experiment(store: &mut ExperimentStore, config: &PipelineConfig) -> Result<String> {
    if let Some(existing) = store.find_experiment(EXPERIMENT_NAME) {
        return Ok(existing.experiment_id().to_string());
    }
    let id = Uuid::new_v4().to_string();
    let snapshot = serde_json::to_value(config)?;
    store.add_experiment(ExperimentRecord::new(&id, EXPERIMENT_NAME).with_config(snapshot));
    Ok(id)
}

fn run_stages(
    config: &PipelineConfig,
    store: &mut ExperimentStore,
    experiment_id: &str,
    parent_id: &str,
) -> Result<PipelineSummary> {
    let ingest = tracked(store, experiment_id, parent_id, INGEST_RUN, |store, run_id| {
        let summary = run_ingest(config)?;
        store.log_param(run_id, "split_size", config.split.test_size.to_string())?;
        Ok(summary)
    })?;

    let train = tracked(store, experiment_id, parent_id, TRAIN_RUN, |store, run_id| {
        let summary = run_train(config)?;
        store.log_param(
            run_id,
            "best_estimator",
            summary.report.pipeline.best_params().to_string(),
        )?;
        store.log_metric(run_id, "best_cv_rmse", summary.report.best_cv_rmse)?;
        store.add_artifact(ArtifactRecord::from_saved(run_id, "pipeline", &summary.artifact))?;
        store.add_artifact(ArtifactRecord::from_saved(
            run_id,
            "preparer",
            &summary.preparer_artifact,
        ))?;
        store.add_artifact(ArtifactRecord::from_saved(
            run_id,
            "model",
            &summary.model_artifact,
        ))?;
        Ok(summary)
    })?;

    let score = tracked(store, experiment_id, parent_id, SCORE_RUN, |store, run_id| {
        let summary = run_score(config)?;
        store.log_metric(run_id, "rmse", summary.report.rmse())?;
        store.add_artifact(ArtifactRecord::from_file(run_id, "output", &summary.output_path)?)?;
        Ok(summary)
    })?;

    Ok(PipelineSummary {
        parent_run_id: parent_id.to_string(),
        ingest,
        train,
        score,
    })
}

/// Run one stage as a child of `parent_id`, recording its outcome
fn tracked<T>(
    store: &mut ExperimentStore,
    experiment_id: &str,
    parent_id: &str,
    run_name: &str,
    stage: impl FnOnce(&mut ExperimentStore, &str) -> Result<T>,
) -> Result<T> {
    let run_id = Uuid::new_v4().to_string();
    store.add_run(
        RunRecord::builder(&run_id, experiment_id, run_name)
            .parent(parent_id)
            .build(),
    )?;
    store.start_run(&run_id)?;
    tracing::info!(run_id = %run_id, "{run_name} started");

    match stage(store, &run_id) {
        Ok(value) => {
            store.complete_run(&run_id, RunStatus::Success)?;
            Ok(value)
        }
        Err(e) => {
            store.fail_run(&run_id, &e.to_string())?;
            Err(e)
        }
    }
}
