//! Dense row-major `f64` matrix.

use chunkflow_common::{ChunkflowError, Result};

/// Row-major matrix; chunking slices it by rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    nrows: usize,
    ncols: usize,
    values: Vec<f64>,
}

impl Matrix {
    /// Build from row-major values. `values.len()` must equal `nrows * ncols`.
    pub fn new(nrows: usize, ncols: usize, values: Vec<f64>) -> Result<Self> {
        let expected = nrows.checked_mul(ncols).ok_or_else(|| {
            ChunkflowError::InvalidInput(format!("matrix shape {nrows}x{ncols} overflows"))
        })?;
        if values.len() != expected {
            return Err(ChunkflowError::InvalidInput(format!(
                "matrix shape {nrows}x{ncols} needs {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Self {
            nrows,
            ncols,
            values,
        })
    }

    /// Build from equally sized rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let ncols = rows.first().map_or(0, Vec::len);
        let nrows = rows.len();
        let mut values = Vec::with_capacity(nrows * ncols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != ncols {
                return Err(ChunkflowError::InvalidInput(format!(
                    "row {i} has {} columns, expected {ncols}",
                    row.len()
                )));
            }
            values.extend(row);
        }
        Ok(Self {
            nrows,
            ncols,
            values,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn row(&self, r: usize) -> Option<&[f64]> {
        if r >= self.nrows {
            return None;
        }
        Some(&self.values[r * self.ncols..(r + 1) * self.ncols])
    }

    pub fn get(&self, r: usize, c: usize) -> Option<f64> {
        if c >= self.ncols {
            return None;
        }
        self.row(r).map(|row| row[c])
    }

    /// Copy of rows `[offset, offset + len)`, clamped to the matrix.
    pub fn slice_rows(&self, offset: usize, len: usize) -> Matrix {
        let start = offset.min(self.nrows);
        let end = start.saturating_add(len).min(self.nrows);
        Matrix {
            nrows: end - start,
            ncols: self.ncols,
            values: self.values[start * self.ncols..end * self.ncols].to_vec(),
        }
    }

    /// Append `other`'s rows below `self`'s.
    pub fn vstack(mut self, other: Matrix) -> Result<Matrix> {
        if self.nrows == 0 {
            return Ok(other);
        }
        if other.nrows == 0 {
            return Ok(self);
        }
        if self.ncols != other.ncols {
            return Err(ChunkflowError::Execution(format!(
                "cannot stack a {}-column matrix under a {}-column matrix",
                other.ncols, self.ncols
            )));
        }
        self.values.extend(other.values);
        self.nrows += other.nrows;
        Ok(self)
    }

    pub(crate) fn into_parts(self) -> (usize, usize, Vec<f64>) {
        (self.nrows, self.ncols, self.values)
    }
}
