//! Dense row-major feature matrix
//!
//! Non-finite inputs are stored at the ends of the `f64` range: `NaN` and
//! `+inf` become `f64::MAX`, `-inf` becomes `f64::MIN`. Split search then
//! orders them the same way whatever the sign bit of a `NaN`, and every
//! split threshold stays finite.

use crate::storage::numeric_column;
use crate::{Error, Result};
use arrow::array::RecordBatch;
use smartcore::linalg::basic::matrix::DenseMatrix;

/// Model-side representation of a feature value
#[must_use]
pub fn model_value(value: f64) -> f64 {
    if value.is_nan() || value == f64::INFINITY {
        f64::MAX
    } else if value == f64::NEG_INFINITY {
        f64::MIN
    } else {
        value
    }
}

/// Row-major `f64` matrix with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    values: Vec<f64>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Build from rows; every row must have one value per name
    ///
    /// # Errors
    /// Returns `SchemaMismatch` on a ragged row
    pub fn from_rows(names: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = names.len();
        let mut values = Vec::with_capacity(rows.len() * n_cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(Error::SchemaMismatch(format!(
                    "row {i} has {} values, expected {n_cols}",
                    row.len()
                )));
            }
            values.extend(row.iter().copied().map(model_value));
        }
        Ok(Self {
            names,
            values,
            n_rows: rows.len(),
        })
    }

    /// Build from a fully numeric table (the output of feature preparation)
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if a column is not numeric or holds nulls
    pub fn from_batch(batch: &RecordBatch) -> Result<Self> {
        let n_rows = batch.num_rows();
        let schema = batch.schema();
        let names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
        let n_cols = names.len();

        let mut values = vec![0.0; n_rows * n_cols];
        for (col, name) in names.iter().enumerate() {
            for (row, value) in numeric_column(batch, name)?.into_iter().enumerate() {
                let value = value.ok_or_else(|| {
                    Error::SchemaMismatch(format!(
                        "feature '{name}' is null at row {row}; prepare features before fitting"
                    ))
                })?;
                values[row * n_cols + col] = model_value(value);
            }
        }

        Ok(Self {
            names,
            values,
            n_rows,
        })
    }

    /// Column names
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of rows
    #[must_use]
    pub const fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    /// Values of one row
    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        let n_cols = self.n_cols();
        &self.values[row * n_cols..(row + 1) * n_cols]
    }

    /// Single value
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.n_cols() + col]
    }

    /// Copy into a smartcore matrix
    #[must_use]
    pub fn to_dense(&self) -> DenseMatrix<f64> {
        DenseMatrix::new(self.n_rows, self.n_cols(), self.values.clone(), false)
    }

    /// New matrix holding the given rows, in the given order
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut values = Vec::with_capacity(rows.len() * self.n_cols());
        for &row in rows {
            values.extend_from_slice(self.row(row));
        }
        Self {
            names: self.names.clone(),
            values,
            n_rows: rows.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::float_table;

    #[test]
    fn test_from_batch_row_major() {
        let batch = float_table(vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![10.0, 20.0]),
        ])
        .unwrap();
        let matrix = FeatureMatrix::from_batch(&batch).unwrap();
        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.n_cols(), 2);
        assert_eq!(matrix.row(1), &[2.0, 20.0]);
        assert_eq!(matrix.get(0, 1), 10.0);
        assert_eq!(matrix.names(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_select_rows() {
        let matrix =
            FeatureMatrix::from_rows(vec!["x".into()], &[vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        let picked = matrix.select_rows(&[2, 2, 0]);
        assert_eq!(picked.n_rows(), 3);
        assert_eq!(picked.row(0), &[3.0]);
        assert_eq!(picked.row(2), &[1.0]);
    }

    #[test]
    fn test_non_finite_values_move_to_range_ends() {
        let zero = std::hint::black_box(0.0_f64);
        let runtime_nan = zero / zero;
        let matrix = FeatureMatrix::from_rows(
            vec!["x".into()],
            &[
                vec![runtime_nan],
                vec![f64::NAN],
                vec![f64::INFINITY],
                vec![f64::NEG_INFINITY],
                vec![1.5],
            ],
        )
        .unwrap();
        assert_eq!(matrix.get(0, 0), f64::MAX);
        assert_eq!(matrix.get(1, 0), f64::MAX);
        assert_eq!(matrix.get(2, 0), f64::MAX);
        assert_eq!(matrix.get(3, 0), f64::MIN);
        assert_eq!(matrix.get(4, 0), 1.5);
    }

    #[test]
    fn test_to_dense_keeps_layout() {
        use smartcore::linalg::basic::arrays::Array;

        let matrix =
            FeatureMatrix::from_rows(vec!["a".into(), "b".into()], &[vec![1.0, 2.0], vec![3.0, 4.0]])
                .unwrap();
        let dense = matrix.to_dense();
        assert_eq!(dense.shape(), (2, 2));
        assert_eq!(*dense.get((1, 0)), 3.0);
        assert_eq!(*dense.get((0, 1)), 2.0);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = FeatureMatrix::from_rows(vec!["x".into(), "y".into()], &[vec![1.0]]);
        assert!(matches!(result, Err(Error::SchemaMismatch(_))));
    }
}
