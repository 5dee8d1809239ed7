//! Random forest regressor
//!
//! Bootstrapped forests are grown by smartcore's
//! `RandomForestRegressor`. Forests without bootstrapping fit every tree on
//! all rows, which smartcore cannot express, so those use the local
//! [`DecisionTreeRegressor`] with the same per-split feature sampling.

use super::{DecisionTreeRegressor, FeatureMatrix};
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor as SmartForest, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;

/// Forest hyperparameters searched by the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Candidate features per split
    pub max_features: usize,
    /// Sample rows with replacement for each tree
    pub bootstrap: bool,
}

impl ForestParams {
    /// Bootstrapped forest
    #[must_use]
    pub const fn new(n_estimators: usize, max_features: usize) -> Self {
        Self {
            n_estimators,
            max_features,
            bootstrap: true,
        }
    }

    /// Same parameters with bootstrapping switched
    #[must_use]
    pub const fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }
}

impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RandomForestRegressor(bootstrap={}, max_features={}, n_estimators={})",
            self.bootstrap, self.max_features, self.n_estimators
        )
    }
}

/// smartcore forest over dense `f64` features and labels
type BaggedForest = SmartForest<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Fitted trees, by sampling scheme
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sampling", content = "trees", rename_all = "snake_case")]
enum Ensemble {
    Bootstrap(BaggedForest),
    FullSample(Vec<DecisionTreeRegressor>),
}

/// Fitted random forest
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    seed: u64,
    feature_names: Vec<String>,
    ensemble: Ensemble,
}

impl RandomForestRegressor {
    /// Fit a forest; the same seed and data always give the same forest
    ///
    /// # Errors
    /// - `FitFailure` if `x` is empty, `y` does not have one label per row,
    ///   or smartcore rejects the data
    /// - `InvalidConfig` if `n_estimators` or `max_features` is zero
    pub fn fit(params: ForestParams, seed: u64, x: &FeatureMatrix, y: &[f64]) -> Result<Self> {
        if x.n_rows() == 0 || x.n_cols() == 0 {
            return Err(Error::FitFailure(format!(
                "cannot fit forest on a {}x{} matrix",
                x.n_rows(),
                x.n_cols()
            )));
        }
        if y.len() != x.n_rows() {
            return Err(Error::FitFailure(format!(
                "{} labels for {} rows",
                y.len(),
                x.n_rows()
            )));
        }
        if params.n_estimators == 0 || params.max_features == 0 {
            return Err(Error::InvalidConfig(format!(
                "n_estimators and max_features must be positive: {params}"
            )));
        }

        let mut max_features = params.max_features;
        if max_features > x.n_cols() {
            tracing::warn!(
                max_features,
                n_features = x.n_cols(),
                "max_features exceeds feature count, clamping"
            );
            max_features = x.n_cols();
        }

        let ensemble = if params.bootstrap {
            let parameters = RandomForestRegressorParameters::default()
                .with_n_trees(params.n_estimators)
                .with_m(max_features)
                .with_seed(seed);
            let forest = BaggedForest::fit(&x.to_dense(), &y.to_vec(), parameters)
                .map_err(|e| Error::FitFailure(format!("forest fit failed: {e}")))?;
            Ensemble::Bootstrap(forest)
        } else {
            let mut master = StdRng::seed_from_u64(seed);
            let trees = (0..params.n_estimators)
                .map(|_| {
                    let mut rng = StdRng::seed_from_u64(master.gen());
                    let all_rows = (0..x.n_rows()).collect();
                    DecisionTreeRegressor::fit(x, y, all_rows, max_features, &mut rng)
                })
                .collect();
            Ensemble::FullSample(trees)
        };

        Ok(Self {
            params,
            seed,
            feature_names: x.names().to_vec(),
            ensemble,
        })
    }

    /// Mean prediction of all trees, one value per row
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if the matrix columns differ from training
    #[allow(clippy::cast_precision_loss)]
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        if x.names() != self.feature_names.as_slice() {
            return Err(Error::SchemaMismatch(format!(
                "model expects features {:?}, got {:?}",
                self.feature_names,
                x.names()
            )));
        }

        match &self.ensemble {
            Ensemble::Bootstrap(forest) => forest
                .predict(&x.to_dense())
                .map_err(|e| Error::SchemaMismatch(format!("forest prediction failed: {e}"))),
            Ensemble::FullSample(trees) => {
                let n_trees = trees.len() as f64;
                Ok((0..x.n_rows())
                    .map(|row| {
                        let values = x.row(row);
                        trees.iter().map(|t| t.predict_row(values)).sum::<f64>() / n_trees
                    })
                    .collect())
            }
        }
    }

    /// Hyperparameters
    #[must_use]
    pub const fn params(&self) -> ForestParams {
        self.params
    }

    /// Seed used for fitting
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Feature names seen at fit time, in order
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Locally grown trees; empty for a bootstrapped forest
    #[must_use]
    pub fn full_sample_trees(&self) -> &[DecisionTreeRegressor] {
        match &self.ensemble {
            Ensemble::Bootstrap(_) => &[],
            Ensemble::FullSample(trees) => trees,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: i32) -> (FeatureMatrix, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![f64::from(i), f64::from(i % 7), f64::from((i * 13) % 11)])
            .collect();
        let y = (0..n).map(|i| 3.0 * f64::from(i) + 1.0).collect();
        let names = vec!["a".into(), "b".into(), "c".into()];
        (FeatureMatrix::from_rows(names, &rows).unwrap(), y)
    }

    #[test]
    fn test_params_display() {
        let params = ForestParams::new(10, 4).with_bootstrap(false);
        assert_eq!(
            params.to_string(),
            "RandomForestRegressor(bootstrap=false, max_features=4, n_estimators=10)"
        );
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = linear_data(60);
        let a = RandomForestRegressor::fit(ForestParams::new(5, 2), 42, &x, &y).unwrap();
        let b = RandomForestRegressor::fit(ForestParams::new(5, 2), 42, &x, &y).unwrap();
        assert_eq!(a, b);
        assert!(a.full_sample_trees().is_empty());
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_no_bootstrap_all_features_fits_training_data() {
        let (x, y) = linear_data(40);
        let params = ForestParams::new(3, 3).with_bootstrap(false);
        let forest = RandomForestRegressor::fit(params, 42, &x, &y).unwrap();
        assert_eq!(forest.full_sample_trees().len(), 3);
        let predictions = forest.predict(&x).unwrap();
        for (p, actual) in predictions.iter().zip(&y) {
            assert!((p - actual).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bootstrap_forest_tracks_trend() {
        let (x, y) = linear_data(100);
        let forest = RandomForestRegressor::fit(ForestParams::new(10, 2), 7, &x, &y).unwrap();
        let predictions = forest.predict(&x).unwrap();
        assert!(predictions[90] > predictions[10]);
    }

    #[test]
    fn test_max_features_clamped() {
        let (x, y) = linear_data(20);
        let forest = RandomForestRegressor::fit(ForestParams::new(2, 8), 42, &x, &y).unwrap();
        assert_eq!(forest.params().max_features, 8);
        assert_eq!(forest.predict(&x).unwrap().len(), 20);
    }

    #[test]
    fn test_fit_rejects_degenerate_input() {
        let (x, y) = linear_data(10);
        assert!(matches!(
            RandomForestRegressor::fit(ForestParams::new(3, 2), 42, &x, &y[..5]),
            Err(Error::FitFailure(_))
        ));
        assert!(matches!(
            RandomForestRegressor::fit(ForestParams::new(0, 2), 42, &x, &y),
            Err(Error::InvalidConfig(_))
        ));
        let empty = x.select_rows(&[]);
        assert!(matches!(
            RandomForestRegressor::fit(ForestParams::new(3, 2), 42, &empty, &[]),
            Err(Error::FitFailure(_))
        ));
    }

    #[test]
    fn test_json_round_trip_for_both_sampling_schemes() {
        let (x, y) = linear_data(30);
        for params in [
            ForestParams::new(3, 2),
            ForestParams::new(3, 2).with_bootstrap(false),
        ] {
            let forest = RandomForestRegressor::fit(params, 42, &x, &y).unwrap();
            let json = serde_json::to_string(&forest).unwrap();
            let restored: RandomForestRegressor = serde_json::from_str(&json).unwrap();
            assert_eq!(restored.params(), params);
            assert_eq!(restored.predict(&x).unwrap(), forest.predict(&x).unwrap());
        }
    }

    #[test]
    fn test_runtime_nan_feature_still_splits() {
        let zero = std::hint::black_box(0.0_f64);
        let mut rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![f64::from(i % 20), f64::from(i % 3)])
            .collect();
        rows[0][0] = zero / zero;
        let y: Vec<f64> = rows
            .iter()
            .map(|r| if r[0] < 10.0 { 5.0 } else { 50.0 })
            .collect();
        let x = FeatureMatrix::from_rows(vec!["a".into(), "b".into()], &rows).unwrap();

        for params in [
            ForestParams::new(5, 2),
            ForestParams::new(3, 2).with_bootstrap(false),
        ] {
            let forest = RandomForestRegressor::fit(params, 42, &x, &y).unwrap();
            let predictions = forest.predict(&x).unwrap();
            assert!(predictions.iter().all(|p| p.is_finite()));
            assert!(predictions[5] < predictions[15], "{params}: {predictions:?}");
        }
    }

    #[test]
    fn test_predict_rejects_other_features() {
        let (x, y) = linear_data(10);
        let forest = RandomForestRegressor::fit(ForestParams::new(2, 2), 42, &x, &y).unwrap();
        let other = FeatureMatrix::from_rows(vec!["z".into()], &[vec![1.0]]).unwrap();
        assert!(matches!(forest.predict(&other), Err(Error::SchemaMismatch(_))));
    }
}
