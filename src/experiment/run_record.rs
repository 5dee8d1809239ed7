//! Run Record - one tracked execution, optionally nested under a parent

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Created, not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished without error.
    Success,
    /// Aborted by an error.
    Failed,
    /// Stopped before completion.
    Cancelled,
}

impl RunStatus {
    /// Whether the run can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A single tracked execution.
///
/// Stage runs (`INGEST_DATA`, `TRAIN_MODEL`, `SCORE_MODEL`) point at the
/// end-to-end run through `parent_run_id`. Params are string-valued and
/// written once per key; a second write replaces the first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    run_id: String,
    experiment_id: String,
    run_name: String,
    parent_run_id: Option<String>,
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RunRecord {
    /// Top-level run in Pending status.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        experiment_id: impl Into<String>,
        run_name: impl Into<String>,
    ) -> Self {
        Self::builder(run_id, experiment_id, run_name).build()
    }

    /// Builder for a run with a parent or initial params.
    #[must_use]
    pub fn builder(
        run_id: impl Into<String>,
        experiment_id: impl Into<String>,
        run_name: impl Into<String>,
    ) -> RunRecordBuilder {
        RunRecordBuilder::new(run_id, experiment_id, run_name)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the owning experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Human-readable run name.
    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Parent run, for nested stage runs.
    #[must_use]
    pub fn parent_run_id(&self) -> Option<&str> {
        self.parent_run_id.as_deref()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Start timestamp, if started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// End timestamp, if completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Logged params, sorted by key.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Single param value.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Error message recorded when the run failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Transition to Running and stamp `started_at`.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Transition to a final status and stamp `ended_at`.
    pub fn complete(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    /// Mark Failed with the error that aborted the run.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.complete(RunStatus::Failed);
    }

    /// Record a param.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }
}

/// Builder for `RunRecord`.
#[derive(Debug)]
pub struct RunRecordBuilder {
    run_id: String,
    experiment_id: String,
    run_name: String,
    parent_run_id: Option<String>,
    params: BTreeMap<String, String>,
}

impl RunRecordBuilder {
    /// Builder with required fields.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        experiment_id: impl Into<String>,
        run_name: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            experiment_id: experiment_id.into(),
            run_name: run_name.into(),
            parent_run_id: None,
            params: BTreeMap::new(),
        }
    }

    /// Nest the run under a parent.
    #[must_use]
    pub fn parent(mut self, parent_run_id: impl Into<String>) -> Self {
        self.parent_run_id = Some(parent_run_id.into());
        self
    }

    /// Seed a param.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Build the `RunRecord` in Pending status.
    #[must_use]
    pub fn build(self) -> RunRecord {
        RunRecord {
            run_id: self.run_id,
            experiment_id: self.experiment_id,
            run_name: self.run_name,
            parent_run_id: self.parent_run_id,
            status: RunStatus::Pending,
            started_at: None,
            ended_at: None,
            params: self.params,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_starts_pending_without_parent() {
        let run = RunRecord::new("run-1", "exp-1", "PARENT_RUN");
        assert_eq!(run.status(), RunStatus::Pending);
        assert!(run.parent_run_id().is_none());
        assert!(run.params().is_empty());
    }

    #[test]
    fn test_fail_records_message() {
        let mut run = RunRecord::builder("run-2", "exp-1", "TRAIN_MODEL")
            .parent("run-1")
            .build();
        run.start();
        run.fail("Fit failure: label is constant");
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.status().is_terminal());
        assert_eq!(run.error(), Some("Fit failure: label is constant"));
        assert_eq!(run.parent_run_id(), Some("run-1"));
    }

    #[test]
    fn test_param_overwrite() {
        let mut run = RunRecord::builder("run-3", "exp-1", "INGEST_DATA")
            .param("split_size", "0.2")
            .build();
        run.set_param("split_size", "0.25");
        assert_eq!(run.param("split_size"), Some("0.25"));
        assert_eq!(run.params().len(), 1);
    }
}
