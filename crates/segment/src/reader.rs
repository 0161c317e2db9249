use std::fs;
use std::path::{Path, PathBuf};

use chunkflow_common::{ChunkflowError, Result};

use crate::layout::{index_json_path, RunIndex, SegmentMeta};
use crate::record::SegmentRecord;
use crate::writer::{SEGMENT_HEADER_LEN, SEGMENT_MAGIC, SEGMENT_VERSION};

pub struct SegmentReader {
    run_dir: PathBuf,
}

impl SegmentReader {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Read every record of a segment, in the order it was written.
    pub fn read_segment<T: SegmentRecord>(&self, meta: &SegmentMeta) -> Result<Vec<T>> {
        let bytes = fs::read(self.run_dir.join(&meta.file))?;
        let records = decode_segment::<T>(&bytes)?;
        if records.len() as u64 != meta.records {
            return Err(ChunkflowError::Segment(format!(
                "segment {} holds {} records, manifest expects {}",
                meta.seq,
                records.len(),
                meta.records
            )));
        }
        Ok(records)
    }

    pub fn read_index(&self) -> Result<RunIndex> {
        let bytes = fs::read(index_json_path(&self.run_dir))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ChunkflowError::Segment(format!("index json decode failed: {e}")))
    }
}

pub fn decode_segment<T: SegmentRecord>(bytes: &[u8]) -> Result<Vec<T>> {
    if bytes.len() < SEGMENT_HEADER_LEN {
        return Err(ChunkflowError::Segment(
            "segment is too small to contain header".to_string(),
        ));
    }
    if &bytes[0..4] != SEGMENT_MAGIC {
        return Err(ChunkflowError::Segment("invalid segment magic".to_string()));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != SEGMENT_VERSION {
        return Err(ChunkflowError::Segment(format!(
            "unsupported segment version {version}"
        )));
    }
    let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;

    // every record needs at least its 8-byte length prefix
    let mut out = Vec::with_capacity(count.min((bytes.len() - SEGMENT_HEADER_LEN) / 8));
    let mut offset = SEGMENT_HEADER_LEN;
    for i in 0..count {
        let len_end = offset + 8;
        if bytes.len() < len_end {
            return Err(ChunkflowError::Segment(format!(
                "segment truncated before record {i} length"
            )));
        }
        let mut len_bytes = [0_u8; 8];
        len_bytes.copy_from_slice(&bytes[offset..len_end]);
        let len = usize::try_from(u64::from_le_bytes(len_bytes)).map_err(|_| {
            ChunkflowError::Segment(format!("record {i} length does not fit in memory"))
        })?;
        let end = len_end
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                ChunkflowError::Segment(format!("segment truncated inside record {i}"))
            })?;
        out.push(T::decode(&bytes[len_end..end])?);
        offset = end;
    }
    if offset != bytes.len() {
        return Err(ChunkflowError::Segment(format!(
            "{} trailing bytes after last record",
            bytes.len() - offset
        )));
    }
    Ok(out)
}
