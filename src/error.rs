//! Error types for housing-value
//!
//! Every variant is fatal to the current run: the pipeline fails fast and
//! never salvages partial results.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// housing-value error types
#[derive(Error, Debug)]
pub enum Error {
    /// Bad split fraction, missing stratification column, or too few rows
    #[error("Invalid split configuration: {0}")]
    InvalidSplitConfiguration(String),

    /// Expected artifact absent or unreadable
    #[error("Missing artifact at {}: {reason}\nRe-run the train stage to produce it", path.display())]
    MissingArtifact {
        /// Path that was looked up
        path: PathBuf,
        /// Why the artifact could not be used
        reason: String,
    },

    /// Columns or artifact schema do not match what a fitted component expects
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Degenerate input to training (empty table, constant label, ...)
    #[error("Fit failure: {0}")]
    FitFailure(String),

    /// Pipeline configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tracking call referenced a run the store does not know
    #[error("Unknown run: {0}")]
    UnknownRun(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error (CSV reader/writer, compute kernels)
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
