//! Scoring held-out data against a trained pipeline

use crate::storage::{float_table, split_label, write_csv};
use crate::train::TrainedPipeline;
use crate::{Error, Result};
use arrow::array::RecordBatch;
use std::path::Path;

/// Report column holding the true labels
pub const ACTUAL_COLUMN: &str = "Actual";
/// Report column holding the model output
pub const PREDICTION_COLUMN: &str = "Prediction";

/// Mean of squared differences
///
/// # Errors
/// Returns `SchemaMismatch` for different lengths and `FitFailure` for
/// empty input
#[allow(clippy::cast_precision_loss)]
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    if actual.len() != predicted.len() {
        return Err(Error::SchemaMismatch(format!(
            "{} actual values but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(Error::FitFailure(
            "cannot compute an error metric over zero rows".to_string(),
        ));
    }

    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum();
    Ok(sum / actual.len() as f64)
}

/// `sqrt(mean((actual - predicted)^2))`
///
/// # Errors
/// Same conditions as [`mean_squared_error`]
pub fn rmse(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    Ok(mean_squared_error(actual, predicted)?.sqrt())
}

/// Actual/predicted pairs in input row order plus summary metrics
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    actual: Vec<f64>,
    predicted: Vec<f64>,
    rmse: f64,
}

impl ScoreReport {
    /// Build a report, computing RMSE
    ///
    /// # Errors
    /// Same conditions as [`rmse`]
    pub fn new(actual: Vec<f64>, predicted: Vec<f64>) -> Result<Self> {
        let rmse = rmse(&actual, &predicted)?;
        Ok(Self {
            actual,
            predicted,
            rmse,
        })
    }

    /// True labels
    #[must_use]
    pub fn actual(&self) -> &[f64] {
        &self.actual
    }

    /// Predictions
    #[must_use]
    pub fn predicted(&self) -> &[f64] {
        &self.predicted
    }

    /// Root-mean-squared error
    #[must_use]
    pub const fn rmse(&self) -> f64 {
        self.rmse
    }

    /// Mean of the true labels
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_actual(&self) -> f64 {
        self.actual.iter().sum::<f64>() / self.actual.len() as f64
    }

    /// RMSE relative to the mean label
    #[must_use]
    pub fn relative_rmse(&self) -> f64 {
        self.rmse / self.mean_actual()
    }

    /// Two-column table `Actual`, `Prediction`
    ///
    /// # Errors
    /// Returns error if the table cannot be built
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        float_table(vec![
            (ACTUAL_COLUMN.to_string(), self.actual.clone()),
            (PREDICTION_COLUMN.to_string(), self.predicted.clone()),
        ])
    }

    /// Write the report as CSV
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_csv(path, &self.to_record_batch()?)
    }
}

/// Replays a trained pipeline on labelled data
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer;

impl Scorer {
    /// Predict a labelled table and compare against its labels.
    ///
    /// The pipeline's own label column is split off first; preparation is
    /// replayed, never re-fitted.
    ///
    /// # Errors
    /// - `SchemaMismatch` if the label or a fitted feature column is absent
    /// - `FitFailure` if a label is missing or the table is empty
    pub fn score(pipeline: &TrainedPipeline, batch: &RecordBatch) -> Result<ScoreReport> {
        tracing::debug!(rows = batch.num_rows(), "Scoring with pipeline");

        let (features, actual) = split_label(batch, pipeline.label_column())?;
        let predicted = pipeline.predict(&features)?;
        let report = ScoreReport::new(actual, predicted)?;

        tracing::info!(
            rmse = report.rmse(),
            mean_actual = report.mean_actual(),
            relative_rmse = report.relative_rmse(),
            "Scored held-out data"
        );
        Ok(report)
    }
}
