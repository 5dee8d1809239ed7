//! Stratified train/test splitting
//!
//! `median_income` is bucketed into five income categories and rows are
//! sampled per category, so the test set keeps the income distribution of
//! the full table.
//!
//! Allocation rule (stratified shuffle split):
//! - `n_test = ceil(test_size * n)`, `n_train = n - n_test`
//! - per-stratum train counts: floor of the proportional share, remainder
//!   handed to the strata with the largest fractional parts
//! - test counts: same rule over what the train side left
//!
//! Every row lands in exactly one side.

use crate::config::SplitConfig;
use crate::schema::INCOME_CATEGORY;
use crate::storage::{drop_column, numeric_column, take_rows};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, RecordBatch, UInt8Array};
use arrow::datatypes::{DataType, Field, FieldRef, Schema};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::sync::Arc;

/// Lower boundaries of the income strata; the last stratum is unbounded above
pub const INCOME_BOUNDARIES: [f64; STRATUM_COUNT] = [0.0, 1.5, 3.0, 4.5, 6.0];

/// Number of income strata
pub const STRATUM_COUNT: usize = 5;

/// Income category (1..=5) of a value.
///
/// Buckets are half-open `[b_i, b_{i+1})`. Values below the first boundary
/// fall into category 1. `NaN` has no category.
#[must_use]
pub fn income_category(value: f64) -> Option<u8> {
    if value.is_nan() {
        return None;
    }
    let bucket = INCOME_BOUNDARIES
        .iter()
        .rposition(|&lower| value >= lower)
        .unwrap_or(0);
    // bucket < STRATUM_COUNT, fits in u8
    #[allow(clippy::cast_possible_truncation)]
    Some(bucket as u8 + 1)
}

/// Append the `income_cat` column computed from `column`
///
/// # Errors
/// Returns `InvalidSplitConfiguration` if the column is missing or not numeric
pub fn label_income_category(batch: &RecordBatch, column: &str) -> Result<RecordBatch> {
    let values = numeric_column(batch, column)
        .map_err(|e| Error::InvalidSplitConfiguration(e.to_string()))?;
    let labels: UInt8Array = values
        .into_iter()
        .map(|v| v.and_then(income_category))
        .collect();

    let base = drop_column(batch, INCOME_CATEGORY)?;
    let mut fields: Vec<FieldRef> = base.schema().fields().iter().cloned().collect();
    fields.push(Arc::new(Field::new(INCOME_CATEGORY, DataType::UInt8, true)));
    let mut columns: Vec<ArrayRef> = base.columns().to_vec();
    columns.push(Arc::new(labels));

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Relative frequency of each stratum (index 0 is category 1)
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn stratum_proportions(strata: &[u8]) -> [f64; STRATUM_COUNT] {
    let counts = stratum_counts(strata);
    let total = strata.len().max(1) as f64;
    counts.map(|c| c as f64 / total)
}

fn stratum_counts(strata: &[u8]) -> [usize; STRATUM_COUNT] {
    let mut counts = [0usize; STRATUM_COUNT];
    for &s in strata {
        if let Some(slot) = usize::from(s).checked_sub(1).and_then(|i| counts.get_mut(i)) {
            *slot += 1;
        }
    }
    counts
}

/// Train/test partition of a table
#[derive(Debug, Clone)]
pub struct Split {
    /// Training rows
    pub train: RecordBatch,
    /// Held-out rows
    pub test: RecordBatch,
}

/// Stratified shuffle splitter
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    config: SplitConfig,
}

impl StratifiedSplitter {
    /// Create a splitter from its configuration
    #[must_use]
    pub const fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Split a table into stratified train and test sets.
    ///
    /// Strata come from the `income_cat` column when the table carries one
    /// (see [`label_income_category`]), otherwise they are bucketed from the
    /// configured stratification column. The stratification label never
    /// appears in either output.
    ///
    /// # Errors
    /// Returns `InvalidSplitConfiguration` if the test size is outside
    /// (0, 1), the table has fewer rows than strata, or the strata source
    /// column is missing, of the wrong type or has missing values
    pub fn split(&self, batch: &RecordBatch) -> Result<Split> {
        let strata = self.strata(batch)?;
        let (train_idx, test_idx) = self.split_indices(&strata)?;

        let base = drop_column(batch, INCOME_CATEGORY)?;
        let train = take_rows(&base, &train_idx)?;
        let test = take_rows(&base, &test_idx)?;

        tracing::info!(
            train_rows = train.num_rows(),
            test_rows = test.num_rows(),
            test_size = self.config.test_size,
            "Stratified split complete"
        );
        Ok(Split { train, test })
    }

    /// Stratum (1..=5) of every row
    ///
    /// # Errors
    /// Same conditions as [`split`](Self::split)
    pub fn strata(&self, batch: &RecordBatch) -> Result<Vec<u8>> {
        if let Some(labels) = batch.column_by_name(INCOME_CATEGORY) {
            let labels = labels.as_any().downcast_ref::<UInt8Array>().ok_or_else(|| {
                Error::InvalidSplitConfiguration(format!(
                    "'{INCOME_CATEGORY}' is {}, expected UInt8",
                    labels.data_type()
                ))
            })?;
            return labels
                .iter()
                .enumerate()
                .map(|(row, label)| {
                    label.ok_or_else(|| {
                        Error::InvalidSplitConfiguration(format!(
                            "'{INCOME_CATEGORY}' is missing at row {row}; every row needs a stratum"
                        ))
                    })
                })
                .collect();
        }

        let column = &self.config.stratify_column;
        numeric_column(batch, column)
            .map_err(|e| Error::InvalidSplitConfiguration(e.to_string()))?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.and_then(income_category).ok_or_else(|| {
                    Error::InvalidSplitConfiguration(format!(
                        "'{column}' is missing at row {row}; every row needs a stratum"
                    ))
                })
            })
            .collect()
    }

    /// Row indices of the train and test sides for precomputed strata
    ///
    /// # Errors
    /// Same conditions as [`split`](Self::split)
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    pub fn split_indices(&self, strata: &[u8]) -> Result<(Vec<usize>, Vec<usize>)> {
        let test_size = self.config.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(Error::InvalidSplitConfiguration(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }

        let n = strata.len();
        if n < STRATUM_COUNT {
            return Err(Error::InvalidSplitConfiguration(format!(
                "table has {n} rows, fewer than the {STRATUM_COUNT} strata"
            )));
        }
        if let Some(bad) = strata.iter().find(|&&s| s == 0 || usize::from(s) > STRATUM_COUNT) {
            return Err(Error::InvalidSplitConfiguration(format!(
                "stratum {bad} outside 1..={STRATUM_COUNT}"
            )));
        }

        let n_test = (test_size * n as f64).ceil() as usize;
        let n_train = n.saturating_sub(n_test);
        if n_train == 0 {
            return Err(Error::InvalidSplitConfiguration(format!(
                "test_size {test_size} leaves no training rows out of {n}"
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let counts = stratum_counts(strata);
        let train_counts = approximate_mode(&counts, n_train, &mut rng);
        let remaining: Vec<usize> = counts
            .iter()
            .zip(&train_counts)
            .map(|(c, t)| c - t)
            .collect();
        let test_counts = approximate_mode(&remaining, n_test, &mut rng);

        let mut train = Vec::with_capacity(n_train);
        let mut test = Vec::with_capacity(n_test);
        for stratum in 0..STRATUM_COUNT {
            let mut members: Vec<usize> = strata
                .iter()
                .enumerate()
                .filter(|(_, &s)| usize::from(s) == stratum + 1)
                .map(|(row, _)| row)
                .collect();
            members.shuffle(&mut rng);

            let (head, tail) = members.split_at(train_counts[stratum]);
            train.extend_from_slice(head);
            test.extend_from_slice(&tail[..test_counts[stratum]]);
        }

        train.shuffle(&mut rng);
        test.shuffle(&mut rng);

        tracing::debug!(?train_counts, ?test_counts, "Per-stratum allocation");
        Ok((train, test))
    }
}

/// Distribute `n_draws` over classes proportionally to `counts`.
///
/// Floors the proportional shares, then gives one extra draw to the classes
/// with the largest fractional remainders (ties broken at random). Never
/// assigns more than a class holds.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
fn approximate_mode(counts: &[usize], n_draws: usize, rng: &mut StdRng) -> Vec<usize> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![0; counts.len()];
    }

    let continuous: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * n_draws as f64 / total as f64)
        .collect();
    let mut floored: Vec<usize> = continuous
        .iter()
        .zip(counts)
        .map(|(&x, &c)| (x.floor() as usize).min(c))
        .collect();

    let mut need = n_draws.saturating_sub(floored.iter().sum());
    if need == 0 {
        return floored;
    }

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.shuffle(rng);
    order.sort_by(|&a, &b| {
        let ra = continuous[a] - floored[a] as f64;
        let rb = continuous[b] - floored[b] as f64;
        rb.partial_cmp(&ra).unwrap_or(Ordering::Equal)
    });

    while need > 0 {
        let before = need;
        for &class in &order {
            if need == 0 {
                break;
            }
            if floored[class] < counts[class] {
                floored[class] += 1;
                need -= 1;
            }
        }
        if need == before {
            break;
        }
    }
    floored
}
