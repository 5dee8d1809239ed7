//! Training stage: feature preparation + grid search, bundled as one
//! replayable pipeline

use crate::config::PipelineConfig;
use crate::features::{FeaturePreparer, PreparerState};
use crate::model::{
    CandidateResult, FeatureMatrix, ForestParams, GridSearch, ParamGrid, RandomForestRegressor,
};
use crate::storage::split_label;
use crate::{Error, Result};
use arrow::array::RecordBatch;
use serde::{Deserialize, Serialize};

/// Fitted preparer and forest, persisted and replayed as a unit
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainedPipeline {
    label_column: String,
    preparer: PreparerState,
    model: RandomForestRegressor,
}

impl TrainedPipeline {
    /// Bundle a preparer state with a forest trained on its output
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if the forest was trained on other columns
    /// than the preparer produces
    pub fn new(
        label_column: impl Into<String>,
        preparer: PreparerState,
        model: RandomForestRegressor,
    ) -> Result<Self> {
        let pipeline = Self {
            label_column: label_column.into(),
            preparer,
            model,
        };
        pipeline.check_consistency()?;
        Ok(pipeline)
    }

    /// Verify the preparer output still lines up with the model inputs
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if they differ
    pub fn check_consistency(&self) -> Result<()> {
        let produced = self.preparer.output_columns();
        if produced.as_slice() != self.model.feature_names() {
            return Err(Error::SchemaMismatch(format!(
                "preparer produces {produced:?} but model expects {:?}",
                self.model.feature_names()
            )));
        }
        Ok(())
    }

    /// Label column the pipeline was trained against
    #[must_use]
    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    /// Fitted preparation parameters
    #[must_use]
    pub const fn preparer(&self) -> &PreparerState {
        &self.preparer
    }

    /// Fitted forest
    #[must_use]
    pub const fn model(&self) -> &RandomForestRegressor {
        &self.model
    }

    /// Hyperparameters chosen by the search
    #[must_use]
    pub const fn best_params(&self) -> ForestParams {
        self.model.params()
    }

    /// Replay preparation on a feature table and predict
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if a fitted column is absent from the table
    pub fn predict(&self, features: &RecordBatch) -> Result<Vec<f64>> {
        let prepared = self.preparer.transform(features)?;
        let matrix = FeatureMatrix::from_batch(&prepared)?;
        self.model.predict(&matrix)
    }
}

/// Outcome of a training run
#[derive(Debug)]
pub struct TrainingReport {
    /// Replayable pipeline (preparer + best forest)
    pub pipeline: TrainedPipeline,
    /// Cross-validation scores per candidate, in grid order
    pub results: Vec<CandidateResult>,
    /// Fold fits performed
    pub fits: usize,
    /// Cross-validated RMSE of the chosen candidate
    pub best_cv_rmse: f64,
}

/// Fits the feature preparer and searches the forest grid
#[derive(Debug, Clone)]
pub struct Trainer {
    preparer: FeaturePreparer,
    search: GridSearch,
    label_column: String,
}

impl Trainer {
    /// Trainer for an explicit preparer and search
    #[must_use]
    pub fn new(
        preparer: FeaturePreparer,
        search: GridSearch,
        label_column: impl Into<String>,
    ) -> Self {
        Self {
            preparer,
            search,
            label_column: label_column.into(),
        }
    }

    /// Trainer using the housing grid and the configured columns and folds
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            FeaturePreparer::from_config(&config.features),
            GridSearch::new(ParamGrid::housing(), &config.search),
            config.features.label_column.clone(),
        )
    }

    /// Train on a labelled table
    ///
    /// # Errors
    /// - `FitFailure` if the table is empty, has no label column, or the
    ///   search cannot fit (constant label, too few rows, ...)
    /// - `SchemaMismatch`/`InvalidConfig` from feature preparation
    pub fn train(&self, table: &RecordBatch) -> Result<TrainingReport> {
        tracing::debug!(rows = table.num_rows(), "Training model");

        if table.num_rows() == 0 {
            return Err(Error::FitFailure("training table is empty".to_string()));
        }
        if table.column_by_name(&self.label_column).is_none() {
            return Err(Error::FitFailure(format!(
                "training table has no label column '{}'",
                self.label_column
            )));
        }

        let (features, labels) = split_label(table, &self.label_column)?;
        let (state, prepared) = self.preparer.fit(&features)?;
        let matrix = FeatureMatrix::from_batch(&prepared)?;
        let outcome = self.search.fit(&matrix, &labels)?;
        let best_cv_rmse = outcome.best_rmse();

        let pipeline = TrainedPipeline::new(self.label_column.clone(), state, outcome.best_model)?;
        Ok(TrainingReport {
            pipeline,
            results: outcome.results,
            fits: outcome.fits,
            best_cv_rmse,
        })
    }
}
