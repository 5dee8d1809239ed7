//! Cross-validated grid search over forest hyperparameters

use super::{FeatureMatrix, ForestParams, RandomForestRegressor};
use crate::config::SearchConfig;
use crate::score::mean_squared_error;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use smartcore::model_selection::{BaseKFold, KFold};

/// Ordered list of hyperparameter candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamGrid {
    candidates: Vec<ForestParams>,
}

impl ParamGrid {
    /// Grid from explicit candidates
    #[must_use]
    pub const fn new(candidates: Vec<ForestParams>) -> Self {
        Self { candidates }
    }

    /// Cartesian product of estimator counts and feature widths
    #[must_use]
    pub fn product(n_estimators: &[usize], max_features: &[usize], bootstrap: bool) -> Self {
        let candidates = n_estimators
            .iter()
            .flat_map(|&n| {
                max_features
                    .iter()
                    .map(move |&m| ForestParams::new(n, m).with_bootstrap(bootstrap))
            })
            .collect();
        Self { candidates }
    }

    /// Append another group of candidates
    #[must_use]
    pub fn union(mut self, other: Self) -> Self {
        self.candidates.extend(other.candidates);
        self
    }

    /// The housing grid: 12 bootstrapped candidates plus 6 without
    /// bootstrapping, 18 in total
    #[must_use]
    pub fn housing() -> Self {
        Self::product(&[3, 10, 30], &[2, 4, 6, 8], true)
            .union(Self::product(&[3, 10], &[2, 3, 4], false))
    }

    /// Candidates in evaluation order
    #[must_use]
    pub fn candidates(&self) -> &[ForestParams] {
        &self.candidates
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the grid has no candidates
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Cross-validation scores of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Hyperparameters
    pub params: ForestParams,
    /// Validation MSE per fold
    pub fold_mse: Vec<f64>,
    /// Mean validation MSE
    pub mean_test_mse: f64,
    /// Mean MSE on the training part of each fold
    pub mean_train_mse: f64,
}

impl CandidateResult {
    /// Square root of the mean validation MSE
    #[must_use]
    pub fn rmse(&self) -> f64 {
        self.mean_test_mse.sqrt()
    }
}

/// Search result: best candidate refit on all rows
#[derive(Debug)]
pub struct SearchOutcome {
    /// Winning hyperparameters
    pub best_params: ForestParams,
    /// Winner refit on the full training data
    pub best_model: RandomForestRegressor,
    /// Scores for every candidate, in grid order
    pub results: Vec<CandidateResult>,
    /// Number of fold fits performed (excluding the refit)
    pub fits: usize,
}

impl SearchOutcome {
    /// Cross-validated RMSE of the winner
    #[must_use]
    pub fn best_rmse(&self) -> f64 {
        self.results
            .iter()
            .find(|r| r.params == self.best_params)
            .map_or(f64::NAN, CandidateResult::rmse)
    }
}

/// Contiguous k-fold partition of the matrix rows, via smartcore's
/// unshuffled `KFold`: the first `n % k` folds get one extra row
#[must_use]
pub fn kfold_indices(x: &FeatureMatrix, k: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    KFold::default()
        .with_n_splits(k)
        .with_shuffle(false)
        .split(&x.to_dense())
        .collect()
}

/// Exhaustive grid search with k-fold cross-validation
#[derive(Debug, Clone)]
pub struct GridSearch {
    grid: ParamGrid,
    folds: usize,
    seed: u64,
}

impl GridSearch {
    /// Search over `grid` with the configured fold count and seed
    #[must_use]
    pub fn new(grid: ParamGrid, config: &SearchConfig) -> Self {
        Self {
            grid,
            folds: config.folds,
            seed: config.seed,
        }
    }

    /// Grid being searched
    #[must_use]
    pub const fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Evaluate every candidate on every fold, pick the lowest mean
    /// validation MSE (first candidate wins ties) and refit it on all rows.
    ///
    /// # Errors
    /// Returns `FitFailure` for an empty matrix, mismatched, missing or
    /// non-finite labels, a constant label, fewer rows than folds, or an
    /// empty grid; a failing fold fit aborts the search
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(&self, x: &FeatureMatrix, y: &[f64]) -> Result<SearchOutcome> {
        self.validate(x, y)?;

        let folds = kfold_indices(x, self.folds);
        let mut results = Vec::with_capacity(self.grid.len());
        let mut fits = 0;

        for &params in self.grid.candidates() {
            let mut fold_mse = Vec::with_capacity(folds.len());
            let mut train_mse = Vec::with_capacity(folds.len());

            for (train_rows, test_rows) in &folds {
                let x_train = x.select_rows(train_rows);
                let y_train: Vec<f64> = train_rows.iter().map(|&i| y[i]).collect();
                let x_test = x.select_rows(test_rows);
                let y_test: Vec<f64> = test_rows.iter().map(|&i| y[i]).collect();

                let model = RandomForestRegressor::fit(params, self.seed, &x_train, &y_train)?;
                fold_mse.push(mean_squared_error(&y_test, &model.predict(&x_test)?)?);
                train_mse.push(mean_squared_error(&y_train, &model.predict(&x_train)?)?);
                fits += 1;
            }

            let mean_test_mse = fold_mse.iter().sum::<f64>() / fold_mse.len() as f64;
            let mean_train_mse = train_mse.iter().sum::<f64>() / train_mse.len() as f64;
            tracing::debug!(
                %params,
                cv_rmse = mean_test_mse.sqrt(),
                train_rmse = mean_train_mse.sqrt(),
                "Candidate evaluated"
            );
            results.push(CandidateResult {
                params,
                fold_mse,
                mean_test_mse,
                mean_train_mse,
            });
        }

        let best = results
            .iter()
            .fold(None::<&CandidateResult>, |best, r| match best {
                Some(b) if b.mean_test_mse <= r.mean_test_mse => Some(b),
                _ => Some(r),
            })
            .ok_or_else(|| Error::FitFailure("grid search produced no candidates".to_string()))?;
        let best_params = best.params;

        let best_model = RandomForestRegressor::fit(best_params, self.seed, x, y)?;
        tracing::info!(
            best = %best_params,
            cv_rmse = best.rmse(),
            fits,
            "Grid search complete"
        );

        Ok(SearchOutcome {
            best_params,
            best_model,
            results,
            fits,
        })
    }

    fn validate(&self, x: &FeatureMatrix, y: &[f64]) -> Result<()> {
        if self.grid.is_empty() {
            return Err(Error::FitFailure("hyperparameter grid is empty".to_string()));
        }
        if x.n_rows() == 0 {
            return Err(Error::FitFailure("training table is empty".to_string()));
        }
        if y.len() != x.n_rows() {
            return Err(Error::FitFailure(format!(
                "{} labels for {} rows",
                y.len(),
                x.n_rows()
            )));
        }
        if let Some(row) = y.iter().position(|v| !v.is_finite()) {
            return Err(Error::FitFailure(format!("label at row {row} is not finite")));
        }
        if y.iter().all(|&v| v == y[0]) {
            return Err(Error::FitFailure(format!(
                "label is constant ({}) across all rows",
                y[0]
            )));
        }
        if self.folds < 2 || x.n_rows() < self.folds {
            return Err(Error::FitFailure(format!(
                "{} rows cannot be split into {} folds",
                x.n_rows(),
                self.folds
            )));
        }
        Ok(())
    }
}
