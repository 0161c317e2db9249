//! Chunkable datasets and their default combine behavior.
//!
//! Three shapes are supported: Arrow tables, dense matrices and 1-D `f64`
//! sequences. Each can report its length, produce a contiguous row range
//! with the same columns/fields, and append another value of the same shape.

use std::fmt;

use arrow::array::{Array, ArrayRef, Float64Array};
use arrow::compute::{cast, concat_batches};
use arrow::record_batch::RecordBatch;
use arrow_schema::DataType;
use chunkflow_common::{ChunkflowError, Result};

use crate::chunk::{ChunkIterator, ChunkRange};
use crate::matrix::Matrix;

/// Length plus contiguous row-range slicing that preserves structure.
pub trait Sliceable {
    /// Number of rows (or elements for 1-D data).
    fn num_rows(&self) -> usize;

    /// Rows `[offset, offset + len)`, clamped to the available rows.
    fn slice_rows(&self, offset: usize, len: usize) -> Self
    where
        Self: Sized;
}

impl Sliceable for RecordBatch {
    fn num_rows(&self) -> usize {
        RecordBatch::num_rows(self)
    }

    fn slice_rows(&self, offset: usize, len: usize) -> Self {
        let offset = offset.min(RecordBatch::num_rows(self));
        let len = len.min(RecordBatch::num_rows(self) - offset);
        self.slice(offset, len)
    }
}

impl Sliceable for Matrix {
    fn num_rows(&self) -> usize {
        self.nrows()
    }

    fn slice_rows(&self, offset: usize, len: usize) -> Self {
        Matrix::slice_rows(self, offset, len)
    }
}

impl Sliceable for Vec<f64> {
    fn num_rows(&self) -> usize {
        self.len()
    }

    fn slice_rows(&self, offset: usize, len: usize) -> Self {
        let start = offset.min(self.len());
        let end = start.saturating_add(len).min(self.len());
        self[start..end].to_vec()
    }
}

/// Shape tag of a [`Dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Columnar Arrow table.
    Table,
    /// Dense row-major matrix.
    Matrix,
    /// 1-D numeric sequence.
    Sequence,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatasetKind::Table => "table",
            DatasetKind::Matrix => "matrix",
            DatasetKind::Sequence => "sequence",
        };
        f.write_str(s)
    }
}

/// Input to, and result of, chunked processing.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    /// Columnar table; rows are sliced, columns preserved.
    Table(RecordBatch),
    /// Matrix sliced by rows.
    Matrix(Matrix),
    /// Sequence sliced by element.
    Sequence(Vec<f64>),
}

impl Dataset {
    /// Wrap a numeric Arrow array as a sequence.
    ///
    /// Integer and decimal arrays are cast to `f64`. Non-numeric arrays and
    /// arrays containing nulls cannot be chunked and are rejected.
    pub fn from_array(array: &ArrayRef) -> Result<Self> {
        if !array.data_type().is_numeric() {
            return Err(ChunkflowError::InvalidInput(format!(
                "cannot chunk a {} array; expected a numeric array, table or matrix",
                array.data_type()
            )));
        }
        if array.null_count() > 0 {
            return Err(ChunkflowError::InvalidInput(format!(
                "sequence contains {} nulls",
                array.null_count()
            )));
        }
        let values = cast(array, &DataType::Float64)
            .map_err(|e| ChunkflowError::InvalidInput(format!("cast to f64 failed: {e}")))?;
        let values = values
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| {
                ChunkflowError::InvalidInput("cast did not produce a Float64 array".to_string())
            })?;
        Ok(Dataset::Sequence(values.values().to_vec()))
    }

    /// Shape tag.
    pub fn kind(&self) -> DatasetKind {
        match self {
            Dataset::Table(_) => DatasetKind::Table,
            Dataset::Matrix(_) => DatasetKind::Matrix,
            Dataset::Sequence(_) => DatasetKind::Sequence,
        }
    }

    /// Rows (tables, matrices) or elements (sequences).
    pub fn len(&self) -> usize {
        match self {
            Dataset::Table(b) => b.num_rows(),
            Dataset::Matrix(m) => m.nrows(),
            Dataset::Sequence(v) => v.len(),
        }
    }

    /// `true` when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows `[offset, offset + len)`. Tables are sliced zero-copy.
    pub fn slice(&self, offset: usize, len: usize) -> Dataset {
        match self {
            Dataset::Table(b) => Dataset::Table(b.slice_rows(offset, len)),
            Dataset::Matrix(m) => Dataset::Matrix(m.slice_rows(offset, len)),
            Dataset::Sequence(v) => Dataset::Sequence(v.slice_rows(offset, len)),
        }
    }

    /// Data for one chunk produced by a [`ChunkIterator`].
    pub fn slice_chunk(&self, range: &ChunkRange) -> Dataset {
        self.slice(range.offset(), range.len())
    }

    /// Approximate in-memory footprint in bytes.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            Dataset::Table(b) => b.get_array_memory_size(),
            Dataset::Matrix(m) => std::mem::size_of_val(m.values()),
            Dataset::Sequence(v) => std::mem::size_of_val(v.as_slice()),
        }
    }

    /// Default combine: row-append for tables and matrices, element-append
    /// for sequences. `self` comes first in the output.
    pub fn concat(self, other: Dataset) -> Result<Dataset> {
        match (self, other) {
            (Dataset::Table(a), Dataset::Table(b)) => {
                let schema = a.schema();
                concat_batches(&schema, [&a, &b])
                    .map(Dataset::Table)
                    .map_err(|e| ChunkflowError::Execution(format!("table concat failed: {e}")))
            }
            (Dataset::Matrix(a), Dataset::Matrix(b)) => a.vstack(b).map(Dataset::Matrix),
            (Dataset::Sequence(mut a), Dataset::Sequence(b)) => {
                a.extend(b);
                Ok(Dataset::Sequence(a))
            }
            (a, b) => Err(ChunkflowError::InvalidInput(format!(
                "cannot combine a {} result with a {} result",
                a.kind(),
                b.kind()
            ))),
        }
    }

    /// Eagerly split into consecutive chunks of at most `chunk_size` rows.
    pub fn split(&self, chunk_size: usize) -> Result<Vec<Dataset>> {
        Ok(ChunkIterator::new(self.len(), chunk_size)?
            .map(|range| self.slice_chunk(&range))
            .collect())
    }
}

impl From<RecordBatch> for Dataset {
    fn from(batch: RecordBatch) -> Self {
        Dataset::Table(batch)
    }
}

impl From<Matrix> for Dataset {
    fn from(matrix: Matrix) -> Self {
        Dataset::Matrix(matrix)
    }
}

impl From<Vec<f64>> for Dataset {
    fn from(values: Vec<f64>) -> Self {
        Dataset::Sequence(values)
    }
}
