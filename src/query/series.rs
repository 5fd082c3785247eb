//! Metric series as Arrow record batches
//!
//! The chart layer consumes series column-wise, so metric rows are reshaped
//! into a three-column `RecordBatch`. Frames can also be written to and read
//! back from Parquet for external tooling.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::experiment::{MetricName, MetricRecord};
use crate::{Error, Result};

/// Step column name.
pub const STEP_COLUMN: &str = "step_index";

/// Schema shared by every metric frame.
#[must_use]
pub fn metric_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(STEP_COLUMN, DataType::UInt64, false),
        Field::new(MetricName::Entropy.as_str(), DataType::Float64, false),
        Field::new(MetricName::UniqueCount.as_str(), DataType::UInt64, false),
    ]))
}

/// Reshape metric rows into a frame with columns
/// `{step_index, entropy, unique_count}`.
///
/// Rows are ordered by ascending step (stable for equal steps). Nothing is
/// dropped, zero values included. No I/O happens here.
///
/// # Errors
///
/// Returns error if Arrow rejects the batch.
pub fn to_series(metrics: &[MetricRecord]) -> Result<MetricFrame> {
    let mut rows: Vec<&MetricRecord> = metrics.iter().collect();
    rows.sort_by_key(|m| m.step_index());

    let steps = UInt64Array::from_iter_values(rows.iter().map(|m| m.step_index()));
    let entropy = Float64Array::from_iter_values(rows.iter().map(|m| m.entropy()));
    let unique = UInt64Array::from_iter_values(rows.iter().map(|m| m.unique_count()));

    let batch = RecordBatch::try_new(
        metric_schema(),
        vec![
            Arc::new(steps) as ArrayRef,
            Arc::new(entropy) as ArrayRef,
            Arc::new(unique) as ArrayRef,
        ],
    )?;
    Ok(MetricFrame { batch })
}

/// Column-oriented metric series for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFrame {
    batch: RecordBatch,
}

impl MetricFrame {
    /// An empty frame with the metric schema.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            batch: RecordBatch::new_empty(metric_schema()),
        }
    }

    /// Number of sampled steps.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Whether the frame has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Underlying record batch.
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Consume the frame, returning the record batch.
    #[must_use]
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    /// Step column.
    #[must_use]
    pub fn steps(&self) -> Vec<u64> {
        self.u64_column(0)
    }

    /// Entropy column.
    #[must_use]
    pub fn entropy(&self) -> Vec<f64> {
        self.batch
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.values().to_vec())
            .unwrap_or_default()
    }

    /// Unique-count column.
    #[must_use]
    pub fn unique_count(&self) -> Vec<u64> {
        self.u64_column(2)
    }

    /// One metric column as floats, ready for a y-axis.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn values(&self, metric: MetricName) -> Vec<f64> {
        match metric {
            MetricName::Entropy => self.entropy(),
            MetricName::UniqueCount => self.unique_count().into_iter().map(|v| v as f64).collect(),
        }
    }

    fn u64_column(&self, index: usize) -> Vec<u64> {
        self.batch
            .column(index)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .map(|a| a.values().to_vec())
            .unwrap_or_default()
    }

    /// Write the frame as a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written.
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = ArrowWriter::try_new(file, self.batch.schema(), None)?;
        writer.write(&self.batch)?;
        writer.close()?;
        Ok(())
    }

    /// Load a frame previously written with [`MetricFrame::write_parquet`].
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, or its schema is not the
    /// metric schema.
    pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Storage(format!("Failed to open Parquet file: {e}"))
        })?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut batches = Vec::new();
        for batch in reader {
            batches.push(batch?);
        }

        let schema = metric_schema();
        if let Some(first) = batches.first() {
            let found = first.schema();
            let compatible = found.fields().len() == schema.fields().len()
                && found
                    .fields()
                    .iter()
                    .zip(schema.fields().iter())
                    .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type());
            if !compatible {
                return Err(Error::Storage(format!(
                    "Schema mismatch: expected {:?}, got {:?}",
                    schema,
                    found
                )));
            }
        }
        let batch = arrow::compute::concat_batches(&schema, &batches)?;
        Ok(Self { batch })
    }
}

impl Default for MetricFrame {
    fn default() -> Self {
        Self::empty()
    }
}
