//! Experiment Record - groups every run of one pipeline configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked experiment.
///
/// Runs reference it by `experiment_id`. The pipeline configuration in
/// effect when the experiment was opened is kept as JSON in `config`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: String,
    name: String,
    created_at: DateTime<Utc>,
    config: Option<serde_json::Value>,
}

impl ExperimentRecord {
    /// New experiment stamped with the current time.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            created_at: Utc::now(),
            config: None,
        }
    }

    /// Attach the configuration snapshot.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Configuration snapshot, if any.
    #[must_use]
    pub const fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_with_config() {
        let config = serde_json::json!({"split": {"test_size": 0.2}});
        let record = ExperimentRecord::new("exp-1", "housing-value").with_config(config.clone());
        assert_eq!(record.name(), "housing-value");
        assert_eq!(record.config(), Some(&config));
    }
}
