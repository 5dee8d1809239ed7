//! Metric Record - numeric results logged against a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One metric value.
///
/// `step` orders repeated values of the same key within a run; the store
/// assigns it when metrics are logged through [`super::ExperimentStore::log_metric`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    step: u64,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// New metric stamped with the current time.
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            step,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the metric key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the wall-clock time the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
