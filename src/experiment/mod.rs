//! Experiment tracking for pipeline runs
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)  PARENT_RUN
//!                              │
//!                              ├──< RunRecord (N)  INGEST_DATA / TRAIN_MODEL / SCORE_MODEL
//!                              ├──< MetricRecord (N) [step-ordered]
//!                              └──< ArtifactRecord (N) [CAS]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use housing_value::experiment::{ExperimentRecord, ExperimentStore, RunRecord, RunStatus};
//!
//! let mut store = ExperimentStore::new();
//! store.add_experiment(ExperimentRecord::new("exp-001", "housing-value"));
//! store.add_run(RunRecord::new("run-001", "exp-001", "PARENT_RUN"))?;
//! store.add_run(
//!     RunRecord::builder("run-002", "exp-001", "SCORE_MODEL")
//!         .parent("run-001")
//!         .build(),
//! )?;
//!
//! store.start_run("run-002")?;
//! store.log_metric("run-002", "rmse", 48_000.0)?;
//! store.complete_run("run-002", RunStatus::Success)?;
//!
//! assert_eq!(store.get_child_runs("run-001").len(), 1);
//! # Ok::<(), housing_value::Error>(())
//! ```

mod artifact_record;
mod experiment_record;
mod metric_record;
mod run_record;
mod store;

pub use artifact_record::ArtifactRecord;
pub use experiment_record::ExperimentRecord;
pub use metric_record::MetricRecord;
pub use run_record::{RunRecord, RunRecordBuilder, RunStatus};
pub use store::ExperimentStore;
