//! Deterministic, ordered slicing of a dataset into chunks.
//!
//! Chunk `i` (1-based) of a dataset of length `N` cut with size `C` covers
//! rows `start = (i - 1) * C + 1` through `end = min(i * C, N)`, both
//! 1-based and inclusive. Only the last chunk may be shorter than `C`.

use chunkflow_common::{ChunkflowError, Result};

use crate::dataset::Dataset;

/// Bounds of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// 1-based chunk ordinal.
    pub index: usize,
    /// First row, 1-based inclusive.
    pub start: usize,
    /// Last row, 1-based inclusive.
    pub end: usize,
}

impl ChunkRange {
    /// 0-based offset of the first row.
    pub fn offset(&self) -> usize {
        self.start - 1
    }

    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// A chunk's bounds together with its data.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub range: ChunkRange,
    /// Number of chunks in the run.
    pub total_chunks: usize,
    pub data: Dataset,
}

impl Chunk {
    pub fn index(&self) -> usize {
        self.range.index
    }

    pub fn is_last(&self) -> bool {
        self.range.index == self.total_chunks
    }
}

/// Bounds of chunk `index` (1-based) for `dataset_len` rows cut into `chunk_size`.
///
/// `None` for index `0`, a zero chunk size, or an index past the last chunk.
pub fn chunk_bounds(dataset_len: usize, chunk_size: usize, index: usize) -> Option<ChunkRange> {
    if index == 0 || chunk_size == 0 || index > dataset_len.div_ceil(chunk_size) {
        return None;
    }
    Some(ChunkRange {
        index,
        start: (index - 1) * chunk_size + 1,
        end: index.saturating_mul(chunk_size).min(dataset_len),
    })
}

/// Cursor over the chunk bounds of a dataset.
#[derive(Debug, Clone)]
pub struct ChunkIterator {
    dataset_len: usize,
    chunk_size: usize,
    total_chunks: usize,
    cursor: usize,
}

impl ChunkIterator {
    pub fn new(dataset_len: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size < 1 {
            return Err(ChunkflowError::InvalidInput(
                "chunk size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            dataset_len,
            chunk_size,
            total_chunks: dataset_len.div_ceil(chunk_size),
            cursor: 0,
        })
    }

    pub fn dataset_len(&self) -> usize {
        self.dataset_len
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn has_next(&self) -> bool {
        self.cursor < self.total_chunks
    }

    /// Next chunk's bounds, or `None` once every chunk was handed out.
    pub fn get_next(&mut self) -> Option<ChunkRange> {
        if !self.has_next() {
            return None;
        }
        self.cursor += 1;
        chunk_bounds(self.dataset_len, self.chunk_size, self.cursor)
    }

    /// Index of the chunk most recently returned; `0` before the first.
    pub fn current_index(&self) -> usize {
        self.cursor
    }

    /// Rewind to before the first chunk.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for ChunkIterator {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total_chunks - self.cursor;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkIterator {}
