//! Experiment Store - tracking data for experiments and their nested runs
//!
//! The store lives in memory during a pipeline invocation and is persisted
//! as a single JSON document afterwards. `BTreeMap`s keep the file stable
//! across saves.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ArtifactRecord, ExperimentRecord, MetricRecord, RunRecord, RunStatus};
use crate::{Error, Result};

/// Tracking data for experiments, runs, metrics and artifacts.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExperimentStore {
    experiments: BTreeMap<String, ExperimentRecord>,
    runs: BTreeMap<String, RunRecord>,
    metrics: Vec<MetricRecord>,
    artifacts: Vec<ArtifactRecord>,
}

impl ExperimentStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
            && self.runs.is_empty()
            && self.metrics.is_empty()
            && self.artifacts.is_empty()
    }

    /// Number of experiments.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Number of runs, nested ones included.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Number of metric values.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Add an experiment, replacing one with the same ID.
    pub fn add_experiment(&mut self, experiment: ExperimentRecord) {
        self.experiments
            .insert(experiment.experiment_id().to_string(), experiment);
    }

    /// Get an experiment by ID.
    #[must_use]
    pub fn get_experiment(&self, experiment_id: &str) -> Option<&ExperimentRecord> {
        self.experiments.get(experiment_id)
    }

    /// Find an experiment by name.
    #[must_use]
    pub fn find_experiment(&self, name: &str) -> Option<&ExperimentRecord> {
        self.experiments.values().find(|e| e.name() == name)
    }

    /// Add a run.
    ///
    /// # Errors
    /// Returns `UnknownRun` if the run names a parent the store does not hold
    pub fn add_run(&mut self, run: RunRecord) -> Result<()> {
        if let Some(parent) = run.parent_run_id() {
            if !self.runs.contains_key(parent) {
                return Err(Error::UnknownRun(format!(
                    "parent '{parent}' of run '{}'",
                    run.run_id()
                )));
            }
        }
        self.runs.insert(run.run_id().to_string(), run);
        Ok(())
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    fn run_mut(&mut self, run_id: &str) -> Result<&mut RunRecord> {
        self.runs
            .get_mut(run_id)
            .ok_or_else(|| Error::UnknownRun(run_id.to_string()))
    }

    /// Runs of an experiment, oldest start first.
    #[must_use]
    pub fn get_runs_for_experiment(&self, experiment_id: &str) -> Vec<&RunRecord> {
        let mut runs: Vec<&RunRecord> = self
            .runs
            .values()
            .filter(|run| run.experiment_id() == experiment_id)
            .collect();
        runs.sort_by_key(|run| run.started_at());
        runs
    }

    /// Runs nested directly under `parent_run_id`, oldest start first.
    #[must_use]
    pub fn get_child_runs(&self, parent_run_id: &str) -> Vec<&RunRecord> {
        let mut runs: Vec<&RunRecord> = self
            .runs
            .values()
            .filter(|run| run.parent_run_id() == Some(parent_run_id))
            .collect();
        runs.sort_by_key(|run| run.started_at());
        runs
    }

    /// Mark a run as Running.
    ///
    /// # Errors
    /// Returns `UnknownRun` if the run does not exist
    pub fn start_run(&mut self, run_id: &str) -> Result<()> {
        self.run_mut(run_id)?.start();
        tracing::debug!(run_id, "Run started");
        Ok(())
    }

    /// Finish a run with a terminal status.
    ///
    /// # Errors
    /// Returns `UnknownRun` if the run does not exist
    pub fn complete_run(&mut self, run_id: &str, status: RunStatus) -> Result<()> {
        self.run_mut(run_id)?.complete(status);
        tracing::debug!(run_id, %status, "Run completed");
        Ok(())
    }

    /// Mark a run Failed with the error that aborted it.
    ///
    /// # Errors
    /// Returns `UnknownRun` if the run does not exist
    pub fn fail_run(&mut self, run_id: &str, message: &str) -> Result<()> {
        self.run_mut(run_id)?.fail(message);
        tracing::warn!(run_id, error = message, "Run failed");
        Ok(())
    }

    /// Record a param on a run.
    ///
    /// # Errors
    /// Returns `UnknownRun` if the run does not exist
    pub fn log_param(
        &mut self,
        run_id: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.run_mut(run_id)?.set_param(key, value);
        Ok(())
    }

    /// Add a metric as given.
    pub fn add_metric(&mut self, metric: MetricRecord) {
        self.metrics.push(metric);
    }

    /// Log a metric value, stepping after earlier values of the same key.
    ///
    /// # Errors
    /// Returns `UnknownRun` if the run does not exist
    pub fn log_metric(&mut self, run_id: &str, key: &str, value: f64) -> Result<()> {
        if !self.runs.contains_key(run_id) {
            return Err(Error::UnknownRun(run_id.to_string()));
        }
        let step = self
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .count() as u64;
        tracing::info!(run_id, key, value, step, "Metric logged");
        self.metrics.push(MetricRecord::new(run_id, key, step, value));
        Ok(())
    }

    /// Metrics for a run and key, ordered by step.
    #[must_use]
    pub fn get_metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .cloned()
            .collect();
        metrics.sort_by_key(MetricRecord::step);
        metrics
    }

    /// Most recent value of a metric.
    #[must_use]
    pub fn latest_metric(&self, run_id: &str, key: &str) -> Option<f64> {
        self.get_metrics_for_run(run_id, key)
            .last()
            .map(MetricRecord::value)
    }

    /// Attach an artifact to its run.
    ///
    /// # Errors
    /// Returns `UnknownRun` if the run does not exist
    pub fn add_artifact(&mut self, artifact: ArtifactRecord) -> Result<()> {
        if !self.runs.contains_key(artifact.run_id()) {
            return Err(Error::UnknownRun(artifact.run_id().to_string()));
        }
        tracing::info!(
            run_id = artifact.run_id(),
            key = artifact.key(),
            hash = artifact.cas_hash(),
            "Artifact logged"
        );
        self.artifacts.push(artifact);
        Ok(())
    }

    /// Artifacts of a run in logging order.
    #[must_use]
    pub fn get_artifacts_for_run(&self, run_id: &str) -> Vec<&ArtifactRecord> {
        self.artifacts
            .iter()
            .filter(|a| a.run_id() == run_id)
            .collect()
    }

    /// Write the store as pretty JSON, creating parent directories.
    ///
    /// # Errors
    /// Returns error if serialization or the write fails
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        tracing::debug!(path = %path.display(), runs = self.run_count(), "Tracking store saved");
        Ok(())
    }

    /// Read a store written by [`Self::save_json`].
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Load an existing store, or start an empty one if the file is absent.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_json(path)
        } else {
            Ok(Self::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_parent() -> ExperimentStore {
        let mut store = ExperimentStore::new();
        store.add_experiment(ExperimentRecord::new("exp-1", "housing-value"));
        store
            .add_run(RunRecord::new("parent", "exp-1", "PARENT_RUN"))
            .unwrap();
        store
    }

    #[test]
    fn test_store_default() {
        let store = ExperimentStore::new();
        assert!(store.is_empty());
        assert_eq!(store.experiment_count(), 0);
        assert_eq!(store.run_count(), 0);
        assert_eq!(store.metric_count(), 0);
    }

    #[test]
    fn test_child_runs() {
        let mut store = store_with_parent();
        for name in ["INGEST_DATA", "TRAIN_MODEL"] {
            let run = RunRecord::builder(name.to_lowercase(), "exp-1", name)
                .parent("parent")
                .build();
            store.add_run(run).unwrap();
        }
        store.add_run(RunRecord::new("other", "exp-1", "PARENT_RUN")).unwrap();

        assert_eq!(store.get_child_runs("parent").len(), 2);
        assert!(store.get_child_runs("other").is_empty());
        assert_eq!(store.get_runs_for_experiment("exp-1").len(), 4);
    }

    #[test]
    fn test_orphan_run_rejected() {
        let mut store = store_with_parent();
        let orphan = RunRecord::builder("child", "exp-1", "SCORE_MODEL")
            .parent("missing")
            .build();
        assert!(matches!(store.add_run(orphan), Err(Error::UnknownRun(_))));
    }

    #[test]
    fn test_log_metric_steps() {
        let mut store = store_with_parent();
        store.log_metric("parent", "rmse", 3.0).unwrap();
        store.log_metric("parent", "rmse", 2.0).unwrap();
        store.add_metric(MetricRecord::new("parent", "loss", 0, 1.0));

        let rmse = store.get_metrics_for_run("parent", "rmse");
        assert_eq!(rmse.len(), 2);
        assert_eq!(rmse[1].step(), 1);
        assert_eq!(store.latest_metric("parent", "rmse"), Some(2.0));
        assert!(store.log_metric("nope", "rmse", 1.0).is_err());
    }

    #[test]
    fn test_get_metrics_for_run_ordering() {
        let mut store = ExperimentStore::new();
        store.add_metric(MetricRecord::new("run-1", "loss", 2, 0.2));
        store.add_metric(MetricRecord::new("run-1", "loss", 0, 0.0));
        store.add_metric(MetricRecord::new("run-1", "loss", 1, 0.1));

        let steps: Vec<u64> = store
            .get_metrics_for_run("run-1", "loss")
            .iter()
            .map(MetricRecord::step)
            .collect();
        assert_eq!(steps, vec![0, 1, 2]);
    }

    #[test]
    fn test_params_and_status_updates() {
        let mut store = store_with_parent();
        store.start_run("parent").unwrap();
        store.log_param("parent", "split_size", "0.2").unwrap();
        store.fail_run("parent", "boom").unwrap();

        let run = store.get_run("parent").unwrap();
        assert_eq!(run.param("split_size"), Some("0.2"));
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(matches!(
            store.complete_run("ghost", RunStatus::Success),
            Err(Error::UnknownRun(_))
        ));
    }

    #[test]
    fn test_json_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts").join("tracking.json");

        let mut store = store_with_parent();
        store.log_metric("parent", "rmse", 1.5).unwrap();
        store
            .add_artifact(ArtifactRecord::new("parent", "pipeline", "pipe.json", "sha256:00", 2))
            .unwrap();
        store.save_json(&path).unwrap();

        let loaded = ExperimentStore::open(&path).unwrap();
        assert_eq!(loaded.run_count(), 1);
        assert_eq!(loaded.latest_metric("parent", "rmse"), Some(1.5));
        assert_eq!(loaded.get_artifacts_for_run("parent").len(), 1);
        assert!(ExperimentStore::open(dir.path().join("absent.json"))
            .unwrap()
            .is_empty());
    }
}
