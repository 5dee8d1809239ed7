//! Pipeline configuration
//!
//! One `PipelineConfig` is loaded per run (TOML file or defaults) and each
//! stage receives the sub-config it needs at construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::schema;
use crate::{Error, Result};

/// Default seed shared by the splitter and the grid search
pub const DEFAULT_SEED: u64 = 42;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// File and directory locations
    pub paths: PathsConfig,
    /// Train/test split settings
    pub split: SplitConfig,
    /// Feature preparation settings
    pub features: FeatureConfig,
    /// Hyperparameter search settings
    pub search: SearchConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// File and directory locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw housing CSV
    pub raw_data: PathBuf,
    /// Directory for `train.csv` and `test.csv`
    pub processed_dir: PathBuf,
    /// Directory for the score report; `processed_dir` when unset
    pub output_dir: Option<PathBuf>,
    /// Directory for the model artifacts and the tracking store
    pub artifacts_dir: PathBuf,
    /// File name of the trained pipeline artifact
    pub pipeline_file: String,
    /// File name of the standalone preparer artifact
    pub preparer_file: String,
    /// File name of the standalone model artifact
    pub model_file: String,
    /// File name of the score report
    pub output_file: String,
    /// File name of the experiment tracking store
    pub tracking_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_data: PathBuf::from("data/raw/housing.csv"),
            processed_dir: PathBuf::from("data/processed"),
            output_dir: None,
            artifacts_dir: PathBuf::from("artifacts"),
            pipeline_file: "pipe.json".to_string(),
            preparer_file: "preparer.json".to_string(),
            model_file: "model.json".to_string(),
            output_file: "output.csv".to_string(),
            tracking_file: "tracking.json".to_string(),
        }
    }
}

impl PathsConfig {
    /// Location of the train split
    #[must_use]
    pub fn train_csv(&self) -> PathBuf {
        self.processed_dir.join("train.csv")
    }

    /// Location of the test split
    #[must_use]
    pub fn test_csv(&self) -> PathBuf {
        self.processed_dir.join("test.csv")
    }

    /// Location of the trained pipeline artifact
    #[must_use]
    pub fn pipeline_artifact(&self) -> PathBuf {
        self.artifacts_dir.join(&self.pipeline_file)
    }

    /// Location of the standalone preparer artifact
    #[must_use]
    pub fn preparer_artifact(&self) -> PathBuf {
        self.artifacts_dir.join(&self.preparer_file)
    }

    /// Location of the standalone model artifact
    #[must_use]
    pub fn model_artifact(&self) -> PathBuf {
        self.artifacts_dir.join(&self.model_file)
    }

    /// Location of the score report
    #[must_use]
    pub fn score_report(&self) -> PathBuf {
        self.output_dir
            .as_ref()
            .unwrap_or(&self.processed_dir)
            .join(&self.output_file)
    }

    /// Location of the experiment tracking store
    #[must_use]
    pub fn tracking_store(&self) -> PathBuf {
        self.artifacts_dir.join(&self.tracking_file)
    }
}

/// Train/test split settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows that go to the test set, in (0, 1)
    pub test_size: f64,
    /// Shuffle seed
    pub seed: u64,
    /// Continuous column bucketed into strata
    pub stratify_column: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: DEFAULT_SEED,
            stratify_column: schema::MEDIAN_INCOME.to_string(),
        }
    }
}

/// Feature preparation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Column one-hot encoded by the preparer
    pub categorical_column: String,
    /// Regression target, removed before preparation
    pub label_column: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            categorical_column: schema::OCEAN_PROXIMITY.to_string(),
            label_column: schema::MEDIAN_HOUSE_VALUE.to_string(),
        }
    }
}

/// Hyperparameter search settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Cross-validation folds
    pub folds: usize,
    /// Forest seed used for every candidate
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            seed: DEFAULT_SEED,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `debug` or `housing_value=info`
    pub level: String,
    /// Optional log file
    pub file: Option<PathBuf>,
    /// Also log to the console
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            file: Some(PathBuf::from("logs/main.log")),
            console: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file; missing keys take their defaults
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or fails validation
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded pipeline configuration");
        Ok(config)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or fails validation
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail deep inside a stage
    ///
    /// # Errors
    /// Returns `InvalidSplitConfiguration` for a test size outside (0, 1) and
    /// `InvalidConfig` for empty column names or fewer than 2 folds
    pub fn validate(&self) -> Result<()> {
        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            return Err(Error::InvalidSplitConfiguration(format!(
                "test_size must be in (0, 1), got {}",
                self.split.test_size
            )));
        }
        if self.split.stratify_column.is_empty() {
            return Err(Error::InvalidConfig(
                "split.stratify_column must not be empty".to_string(),
            ));
        }
        if self.features.categorical_column.is_empty() {
            return Err(Error::InvalidConfig(
                "features.categorical_column must not be empty".to_string(),
            ));
        }
        if self.features.label_column.is_empty() {
            return Err(Error::InvalidConfig(
                "features.label_column must not be empty".to_string(),
            ));
        }
        if self.search.folds < 2 {
            return Err(Error::InvalidConfig(format!(
                "search.folds must be at least 2, got {}",
                self.search.folds
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_housing_layout() {
        let config = PipelineConfig::default();
        assert!((config.split.test_size - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.split.seed, 42);
        assert_eq!(config.features.categorical_column, "ocean_proximity");
        assert_eq!(config.search.folds, 5);
        assert_eq!(
            config.paths.pipeline_artifact(),
            PathBuf::from("artifacts/pipe.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [split]
            test_size = 0.1

            [paths]
            processed_dir = "out"
            "#,
        )
        .unwrap();

        assert!((config.split.test_size - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.split.seed, 42);
        assert_eq!(config.paths.train_csv(), PathBuf::from("out/train.csv"));
        assert_eq!(config.features.label_column, "median_house_value");
    }

    #[test]
    fn test_score_report_follows_output_dir() {
        let mut paths = PathsConfig::default();
        assert_eq!(paths.score_report(), PathBuf::from("data/processed/output.csv"));

        paths.output_dir = Some(PathBuf::from("reports"));
        assert_eq!(paths.score_report(), PathBuf::from("reports/output.csv"));
        assert_eq!(paths.test_csv(), PathBuf::from("data/processed/test.csv"));
        assert_eq!(paths.model_artifact(), PathBuf::from("artifacts/model.json"));
        assert_eq!(
            paths.preparer_artifact(),
            PathBuf::from("artifacts/preparer.json")
        );
    }

    #[test]
    fn test_rejects_bad_test_size() {
        let result = PipelineConfig::from_toml_str("[split]\ntest_size = 1.5\n");
        assert!(matches!(result, Err(Error::InvalidSplitConfiguration(_))));
    }

    #[test]
    fn test_rejects_empty_categorical_column() {
        let result = PipelineConfig::from_toml_str("[features]\ncategorical_column = \"\"\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = PipelineConfig::from_toml_str("[split\n");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }
}
