//! Storage backend (Arrow/CSV)
//!
//! Tables are Arrow `RecordBatch`es. The raw, train and test files all share
//! the housing schema; the score report is a two-column table.
//!
//! Write pattern is whole-file: every stage writes its output once and
//! downstream stages only read it.

use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow::compute;
use arrow::datatypes::{DataType, SchemaRef};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

/// Rows per batch when reading CSV
pub const CSV_BATCH_SIZE: usize = 8192;

/// Storage engine for CSV-backed tables
pub struct StorageEngine {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl StorageEngine {
    /// Create a new storage engine from existing batches
    ///
    /// Useful for testing and for tables built in memory
    #[must_use]
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    /// Load a table from a CSV file with a header row
    ///
    /// The header must name exactly the fields of `schema`, in order.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if the header differs from the schema, or an
    /// IO/Arrow error if the file cannot be read or parsed
    pub fn load_csv<P: AsRef<Path>>(path: P, schema: SchemaRef) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Reading CSV table");

        validate_header(path, &schema)?;

        let file = File::open(path)?;
        let reader = arrow::csv::ReaderBuilder::new(schema.clone())
            .with_header(true)
            .with_batch_size(CSV_BATCH_SIZE)
            .build(file)?;

        let mut batches = Vec::new();
        for batch in reader {
            batches.push(batch?);
        }

        let storage = Self { schema, batches };
        tracing::info!(
            path = %path.display(),
            rows = storage.num_rows(),
            "Loaded CSV table"
        );
        Ok(storage)
    }

    /// Get all record batches
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Schema shared by every batch
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Total row count across batches
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Append a batch
    ///
    /// # Errors
    ///
    /// Returns error if batch schema doesn't match the storage schema
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if batch.schema() != self.schema {
            return Err(Error::SchemaMismatch(format!(
                "expected {:?}, got {:?}",
                self.schema,
                batch.schema()
            )));
        }

        self.batches.push(batch);
        Ok(())
    }

    /// Concatenate all batches into a single table
    ///
    /// # Errors
    /// Returns error if concatenation fails
    pub fn table(&self) -> Result<RecordBatch> {
        Ok(compute::concat_batches(&self.schema, &self.batches)?)
    }
}

/// Write a table as CSV with a header row, creating parent directories
///
/// # Errors
/// Returns error if the file cannot be created or written
pub fn write_csv<P: AsRef<Path>>(path: P, batch: &RecordBatch) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .build(file);
    writer.write(batch)?;

    tracing::info!(path = %path.display(), rows = batch.num_rows(), "Stored CSV table");
    Ok(())
}

fn validate_header(path: &Path, schema: &SchemaRef) -> Result<()> {
    let mut first_line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first_line)?;

    let found: Vec<&str> = first_line
        .trim_end_matches(['\r', '\n'])
        .split(',')
        .map(str::trim)
        .collect();
    let expected: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();

    if found != expected {
        return Err(Error::SchemaMismatch(format!(
            "{} has header {found:?}, expected {expected:?}",
            path.display()
        )));
    }
    Ok(())
}

/// Select rows by position, preserving the given order
///
/// # Errors
/// Returns error if an index is out of bounds
pub fn take_rows(batch: &RecordBatch, indices: &[usize]) -> Result<RecordBatch> {
    let indices = indices
        .iter()
        .map(|&i| {
            u32::try_from(i).map_err(|_| {
                Error::SchemaMismatch(format!("row index {i} exceeds u32 range"))
            })
        })
        .collect::<Result<Vec<u32>>>()?;
    let indices = UInt32Array::from(indices);

    let columns = batch
        .columns()
        .iter()
        .map(|column| compute::take(column.as_ref(), &indices, None))
        .collect::<std::result::Result<Vec<ArrayRef>, _>>()?;

    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}

/// Drop a column by name; a table without that column is returned unchanged
///
/// # Errors
/// Returns error if the projection fails
pub fn drop_column(batch: &RecordBatch, name: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let keep: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| field.name() != name)
        .map(|(i, _)| i)
        .collect();

    if keep.len() == schema.fields().len() {
        return Ok(batch.clone());
    }
    Ok(batch.project(&keep)?)
}

/// Read a column as `f64` values, casting integer columns; nulls stay `None`
///
/// # Errors
/// Returns `SchemaMismatch` if the column is missing or not numeric
pub fn numeric_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<f64>>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::SchemaMismatch(format!("column '{name}' not found")))?;

    if !column.data_type().is_numeric() {
        return Err(Error::SchemaMismatch(format!(
            "column '{name}' has type {:?}, expected a numeric type",
            column.data_type()
        )));
    }

    let casted = compute::cast(column, &DataType::Float64)?;
    let values = casted
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| {
            Error::SchemaMismatch(format!("failed to read column '{name}' as Float64"))
        })?;

    Ok(values.iter().collect())
}

/// Read a column as strings; nulls stay `None`
///
/// # Errors
/// Returns `SchemaMismatch` if the column is missing or not `Utf8`
pub fn string_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::SchemaMismatch(format!("column '{name}' not found")))?;

    let values = column
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "column '{name}' has type {:?}, expected Utf8",
                column.data_type()
            ))
        })?;

    Ok(values.iter().map(|v| v.map(str::to_string)).collect())
}

/// Split a table into its feature columns and a label vector
///
/// # Errors
/// Returns `SchemaMismatch` if the label column is missing or not numeric,
/// `FitFailure` if a label value is missing
pub fn split_label(batch: &RecordBatch, label: &str) -> Result<(RecordBatch, Vec<f64>)> {
    let labels = numeric_column(batch, label)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| {
                Error::FitFailure(format!("label '{label}' is missing at row {row}"))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    let features = drop_column(batch, label)?;
    Ok((features, labels))
}

/// Build a table of non-null `Float64` columns
///
/// # Errors
/// Returns error if the columns have different lengths
pub fn float_table(columns: Vec<(String, Vec<f64>)>) -> Result<RecordBatch> {
    let fields: Vec<arrow::datatypes::Field> = columns
        .iter()
        .map(|(name, _)| arrow::datatypes::Field::new(name, DataType::Float64, false))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|(_, values)| Arc::new(Float64Array::from(values)) as ArrayRef)
        .collect();

    Ok(RecordBatch::try_new(
        Arc::new(arrow::datatypes::Schema::new(fields)),
        arrays,
    )?)
}
