use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chunkflow_common::{ChunkflowError, Result, SegmentSeq};
use tracing::debug;

use crate::layout::{index_json_path, segment_file_name, RunIndex, SegmentMeta};
use crate::record::SegmentRecord;

pub const SEGMENT_MAGIC: &[u8; 4] = b"CKSG";
pub const SEGMENT_VERSION: u32 = 1;
pub(crate) const SEGMENT_HEADER_LEN: usize = 12;

pub struct SegmentWriter {
    run_dir: PathBuf,
}

impl SegmentWriter {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Write `records` as segment `seq`. Existing files are never overwritten.
    ///
    /// A partially written file is removed before the error is returned.
    pub fn write_segment<T: SegmentRecord>(
        &self,
        seq: SegmentSeq,
        records: &[T],
    ) -> Result<SegmentMeta> {
        if records.is_empty() {
            return Err(ChunkflowError::InvalidInput(
                "segment cannot be empty".to_string(),
            ));
        }
        let count = u32::try_from(records.len()).map_err(|_| {
            ChunkflowError::Segment(format!("too many records for one segment: {}", records.len()))
        })?;

        fs::create_dir_all(&self.run_dir)?;
        let rel = segment_file_name(seq);
        let abs = self.run_dir.join(&rel);
        let file = OpenOptions::new().write(true).create_new(true).open(&abs)?;

        if let Err(e) = write_records(file, count, records) {
            let _ = fs::remove_file(&abs);
            return Err(e);
        }

        let bytes = fs::metadata(&abs)?.len();
        let rows = records.iter().map(|r| r.rows() as u64).sum();
        debug!(segment = %seq, file = %rel, bytes, rows, "segment written");

        Ok(SegmentMeta {
            seq,
            file: rel,
            bytes,
            records: u64::from(count),
            rows,
        })
    }

    /// Replace the run manifest with `index`.
    pub fn write_index(&self, index: &RunIndex) -> Result<()> {
        fs::create_dir_all(&self.run_dir)?;
        let json_bytes = serde_json::to_vec_pretty(index)
            .map_err(|e| ChunkflowError::Segment(format!("index json encode failed: {e}")))?;
        fs::write(index_json_path(&self.run_dir), json_bytes)?;
        Ok(())
    }
}

fn write_records<T: SegmentRecord>(file: File, count: u32, records: &[T]) -> Result<()> {
    let mut out = BufWriter::new(file);
    out.write_all(SEGMENT_MAGIC)?;
    out.write_all(&SEGMENT_VERSION.to_le_bytes())?;
    out.write_all(&count.to_le_bytes())?;

    let mut payload = Vec::new();
    for r in records {
        payload.clear();
        r.encode(&mut payload)?;
        out.write_all(&(payload.len() as u64).to_le_bytes())?;
        out.write_all(&payload)?;
    }
    out.flush()?;
    Ok(())
}
