use std::path::{Path, PathBuf};

use chunkflow_common::{RunId, SegmentSeq};
use serde::{Deserialize, Serialize};

pub const RUN_DIR_PREFIX: &str = "chunkflow-run-";
pub const INDEX_JSON: &str = "index.json";

pub fn run_dir_name(run_id: &RunId) -> String {
    format!("{RUN_DIR_PREFIX}{run_id}")
}

pub fn run_dir(parent: &Path, run_id: &RunId) -> PathBuf {
    parent.join(run_dir_name(run_id))
}

pub fn segment_file_name(seq: SegmentSeq) -> String {
    format!("segment-{:04}", seq.0)
}

pub fn index_json_path(run_dir: &Path) -> PathBuf {
    run_dir.join(INDEX_JSON)
}

/// Metadata for one written segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub seq: SegmentSeq,
    /// File name relative to the run directory.
    pub file: String,
    pub bytes: u64,
    /// Number of buffered results stored in the file.
    pub records: u64,
    /// Sum of the records' row counts.
    pub rows: u64,
}

/// Manifest of every segment a run has written, in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIndex {
    pub run_id: RunId,
    pub segments: Vec<SegmentMeta>,
}
