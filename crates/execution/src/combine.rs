//! Ordered merge of spilled segments and the in-memory tail.
//!
//! Merge order is chronological: segments in ascending sequence number, each
//! reduced left-to-right, then the still-buffered results as the newest term.

use std::fs;

use chunkflow_common::Result;
use chunkflow_segment::{SegmentMeta, SegmentReader, SegmentRecord};
use tracing::{debug, warn};

/// Left fold over results with a caller-supplied binary combine.
pub struct Combiner<F> {
    combine: F,
}

impl<F> Combiner<F> {
    pub fn new(combine: F) -> Self {
        Self { combine }
    }

    /// Reduce `items` left-to-right. `None` when there is nothing to reduce.
    pub fn fold<T, I>(&mut self, items: I) -> Result<Option<T>>
    where
        F: FnMut(T, T) -> Result<T>,
        I: IntoIterator<Item = T>,
    {
        let mut acc = None;
        for item in items {
            acc = Some(match acc {
                None => item,
                Some(prev) => (self.combine)(prev, item)?,
            });
        }
        Ok(acc)
    }

    /// Merge `segments` (oldest first) and then `buffer`.
    ///
    /// Each segment is read once and its file removed after reading. Returns
    /// `None` when there are no segments and the buffer is empty.
    pub fn merge<T>(
        &mut self,
        reader: &SegmentReader,
        mut segments: Vec<SegmentMeta>,
        buffer: Vec<T>,
    ) -> Result<Option<T>>
    where
        T: SegmentRecord,
        F: FnMut(T, T) -> Result<T>,
    {
        segments.sort_by_key(|m| m.seq);

        let mut acc: Option<T> = None;
        for meta in &segments {
            let records = reader.read_segment::<T>(meta)?;
            let path = reader.run_dir().join(&meta.file);
            if let Err(e) = fs::remove_file(&path) {
                warn!(segment = %meta.seq, error = %e, "merged segment could not be removed");
            }
            debug!(segment = %meta.seq, records = records.len(), rows = meta.rows, "merging segment");
            let reduced = self.fold(records)?;
            acc = self.fold(acc.into_iter().chain(reduced))?;
        }

        let tail = self.fold(buffer)?;
        self.fold(acc.into_iter().chain(tail))
    }
}

#[cfg(test)]
mod tests {
    use chunkflow_common::ChunkflowError;

    use super::*;

    #[test]
    fn fold_is_left_to_right() {
        let mut c = Combiner::new(|a: String, b: String| -> Result<String> {
            Ok(format!("({a}{b})"))
        });
        let out = c
            .fold(["a", "b", "c"].map(String::from))
            .expect("fold");
        assert_eq!(out.as_deref(), Some("((ab)c)"));
        assert_eq!(c.fold(Vec::<String>::new()).expect("empty"), None);
        assert_eq!(
            c.fold(vec!["x".to_string()]).expect("single").as_deref(),
            Some("x")
        );
    }

    #[test]
    fn fold_propagates_combine_errors() {
        let mut c = Combiner::new(|_: u32, _: u32| -> Result<u32> {
            Err(ChunkflowError::Execution("boom".to_string()))
        });
        assert!(c.fold(vec![1, 2]).is_err());
        assert_eq!(c.fold(vec![1]).expect("single needs no combine"), Some(1));
    }
}
