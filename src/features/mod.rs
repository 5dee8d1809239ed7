//! Feature preparation
//!
//! A single stateful preparer: [`FeaturePreparer::fit`] learns a
//! [`PreparerState`] from training data and produces the training matrix by
//! calling [`PreparerState::transform`], the same code path used at scoring
//! time. Replay therefore cannot drift from the fitted transform.
//!
//! Output column order:
//! 1. numeric columns (median-imputed) in input order
//! 2. `rooms_per_household`, `bedrooms_per_room`, `population_per_household`
//! 3. one indicator per vocabulary entry except the first
//!
//! Ratio features divide without guarding zero denominators; the resulting
//! infinities/NaNs are kept and counted in a `warn!`.

use crate::config::FeatureConfig;
use crate::schema;
use crate::storage::{float_table, numeric_column, string_column};
use crate::{Error, Result};
use arrow::array::RecordBatch;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Median imputation parameters for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputedColumn {
    /// Column name
    pub name: String,
    /// Median of the observed training values
    pub median: f64,
}

/// A derived `numerator / denominator` feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioFeature {
    /// Output column name
    pub name: String,
    /// Numerator column (after imputation)
    pub numerator: String,
    /// Denominator column (after imputation)
    pub denominator: String,
}

impl RatioFeature {
    fn new(name: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            name: name.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        }
    }
}

/// The three housing ratio features, in output order
#[must_use]
pub fn housing_ratios() -> Vec<RatioFeature> {
    vec![
        RatioFeature::new("rooms_per_household", schema::TOTAL_ROOMS, schema::HOUSEHOLDS),
        RatioFeature::new("bedrooms_per_room", schema::TOTAL_BEDROOMS, schema::TOTAL_ROOMS),
        RatioFeature::new(
            "population_per_household",
            schema::POPULATION,
            schema::HOUSEHOLDS,
        ),
    ]
}

/// One-hot encoding parameters, first vocabulary entry dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoding {
    /// Encoded column
    pub column: String,
    /// Sorted distinct values seen at fit time
    pub vocabulary: Vec<String>,
}

impl CategoricalEncoding {
    /// Names of the emitted indicator columns (vocabulary minus its first entry)
    #[must_use]
    pub fn indicator_columns(&self) -> Vec<String> {
        self.vocabulary
            .iter()
            .skip(1)
            .map(|value| format!("{}_{value}", self.column))
            .collect()
    }
}

/// Fitted, immutable preparation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparerState {
    numeric: Vec<ImputedColumn>,
    ratios: Vec<RatioFeature>,
    categorical: CategoricalEncoding,
}

impl PreparerState {
    /// Imputation values, in output order
    #[must_use]
    pub fn numeric(&self) -> &[ImputedColumn] {
        &self.numeric
    }

    /// Derived ratio features, in output order
    #[must_use]
    pub fn ratios(&self) -> &[RatioFeature] {
        &self.ratios
    }

    /// Categorical encoding
    #[must_use]
    pub const fn categorical(&self) -> &CategoricalEncoding {
        &self.categorical
    }

    /// Median stored for a numeric column
    #[must_use]
    pub fn median(&self, column: &str) -> Option<f64> {
        self.numeric
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.median)
    }

    /// Columns produced by [`transform`](Self::transform), in order
    #[must_use]
    pub fn output_columns(&self) -> Vec<String> {
        self.numeric
            .iter()
            .map(|c| c.name.clone())
            .chain(self.ratios.iter().map(|r| r.name.clone()))
            .chain(self.categorical.indicator_columns())
            .collect()
    }

    /// Replay the fitted preparation on a table without re-fitting.
    ///
    /// Extra input columns are ignored. Unseen or null categories encode as
    /// all-zero indicators.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if a fitted numeric column or the
    /// categorical column is absent or has the wrong type
    pub fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let width = self.numeric.len() + self.ratios.len() + self.categorical.vocabulary.len();
        let mut columns: Vec<(String, Vec<f64>)> = Vec::with_capacity(width);

        for imputed in &self.numeric {
            let values = numeric_column(batch, &imputed.name)?
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()).unwrap_or(imputed.median))
                .collect();
            columns.push((imputed.name.clone(), values));
        }

        let position: HashMap<&str, usize> = self
            .numeric
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), i))
            .collect();
        for ratio in &self.ratios {
            let lookup = |name: &str| {
                position.get(name).copied().ok_or_else(|| {
                    Error::SchemaMismatch(format!(
                        "ratio '{}' needs numeric column '{name}'",
                        ratio.name
                    ))
                })
            };
            let numerator = &columns[lookup(&ratio.numerator)?].1;
            let denominator = &columns[lookup(&ratio.denominator)?].1;

            let values: Vec<f64> = numerator
                .iter()
                .zip(denominator)
                .map(|(n, d)| n / d)
                .collect();
            let non_finite = values.iter().filter(|v| !v.is_finite()).count();
            if non_finite > 0 {
                tracing::warn!(
                    feature = %ratio.name,
                    rows = non_finite,
                    "Ratio feature produced non-finite values"
                );
            }
            columns.push((ratio.name.clone(), values));
        }

        let categories = string_column(batch, &self.categorical.column)?;
        for (value, name) in self
            .categorical
            .vocabulary
            .iter()
            .skip(1)
            .zip(self.categorical.indicator_columns())
        {
            let indicator = categories
                .iter()
                .map(|c| if c.as_deref() == Some(value.as_str()) { 1.0 } else { 0.0 })
                .collect();
            columns.push((name, indicator));
        }

        float_table(columns)
    }
}

/// Fits a [`PreparerState`]
#[derive(Debug, Clone)]
pub struct FeaturePreparer {
    categorical_column: String,
}

impl FeaturePreparer {
    /// Preparer that one-hot encodes `categorical_column`
    #[must_use]
    pub fn new(categorical_column: impl Into<String>) -> Self {
        Self {
            categorical_column: categorical_column.into(),
        }
    }

    /// Preparer built from the feature configuration
    #[must_use]
    pub fn from_config(config: &FeatureConfig) -> Self {
        Self::new(config.categorical_column.clone())
    }

    /// Learn medians and vocabulary, then transform the same table.
    ///
    /// Every column other than the categorical one is treated as a numeric
    /// feature, so the label must be removed beforehand.
    ///
    /// # Errors
    /// - `InvalidConfig` if the categorical column name is empty
    /// - `SchemaMismatch` if the categorical column or a ratio input is
    ///   missing, or a feature column is not numeric
    /// - `FitFailure` if the table is empty, a numeric column has no
    ///   observed values, or the vocabulary is empty
    pub fn fit(&self, batch: &RecordBatch) -> Result<(PreparerState, RecordBatch)> {
        tracing::debug!(rows = batch.num_rows(), "Fitting feature preparer");

        if self.categorical_column.is_empty() {
            return Err(Error::InvalidConfig(
                "categorical column name must be set before fitting".to_string(),
            ));
        }
        if batch.num_rows() == 0 {
            return Err(Error::FitFailure(
                "cannot fit feature preparer on an empty table".to_string(),
            ));
        }

        let categories = string_column(batch, &self.categorical_column)?;
        let vocabulary: Vec<String> = categories
            .into_iter()
            .flatten()
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        if vocabulary.is_empty() {
            return Err(Error::FitFailure(format!(
                "categorical column '{}' has no values",
                self.categorical_column
            )));
        }

        let schema = batch.schema();
        let mut numeric = Vec::new();
        for field in schema.fields() {
            if field.name() == &self.categorical_column {
                continue;
            }
            let median = median(&numeric_column(batch, field.name())?).ok_or_else(|| {
                Error::FitFailure(format!("column '{}' has no observed values", field.name()))
            })?;
            numeric.push(ImputedColumn {
                name: field.name().clone(),
                median,
            });
        }

        let ratios = housing_ratios();
        for ratio in &ratios {
            for input in [&ratio.numerator, &ratio.denominator] {
                if !numeric.iter().any(|c| &c.name == input) {
                    return Err(Error::SchemaMismatch(format!(
                        "ratio '{}' needs numeric column '{input}'",
                        ratio.name
                    )));
                }
            }
        }

        let state = PreparerState {
            numeric,
            ratios,
            categorical: CategoricalEncoding {
                column: self.categorical_column.clone(),
                vocabulary,
            },
        };
        let transformed = state.transform(batch)?;

        tracing::info!(
            numeric_columns = state.numeric.len(),
            vocabulary = ?state.categorical.vocabulary,
            output_columns = transformed.num_columns(),
            "Feature preparer fitted"
        );
        Ok((state, transformed))
    }
}

/// Median of the non-null, non-NaN values; midpoint of the two central
/// values for even counts
fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut observed: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    if observed.is_empty() {
        return None;
    }
    observed.sort_by(f64::total_cmp);

    let mid = observed.len() / 2;
    if observed.len() % 2 == 0 {
        Some((observed[mid - 1] + observed[mid]) / 2.0)
    } else {
        Some(observed[mid])
    }
}
