#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use arrow::array::{Array, ArrayRef, Int64Array};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema};
use chunkflow::{Dataset, MemoryProbe};
use parquet::arrow::ArrowWriter;

pub fn unique_path(prefix: &str, ext: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{nanos}.{ext}"))
}

/// Fresh, existing scratch parent for one test.
pub fn scratch_parent(prefix: &str) -> PathBuf {
    let dir = unique_path(prefix, "dir");
    fs::create_dir_all(&dir).expect("create scratch parent");
    dir
}

/// Entries left under `dir`; `0` when it does not exist.
pub fn entries_in(dir: &Path) -> usize {
    fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
}

pub fn write_parquet(path: &Path, batch: &RecordBatch) {
    let file = File::create(path).expect("create parquet");
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).expect("writer");
    writer.write(batch).expect("write batch");
    writer.close().expect("close writer");
}

/// Two-column int64 table `x = 1..=n`, `y = n+1..=2n`.
pub fn xy_table(n: i64) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::Int64, false),
        Field::new("y", DataType::Int64, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from_iter_values(1..=n)) as ArrayRef,
            Arc::new(Int64Array::from_iter_values(n + 1..=2 * n)) as ArrayRef,
        ],
    )
    .expect("xy batch")
}

pub fn int64_column(ds: &Dataset, name: &str) -> Vec<i64> {
    let Dataset::Table(batch) = ds else {
        panic!("expected table, got {}", ds.kind());
    };
    batch
        .column_by_name(name)
        .expect("column")
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("int64 column")
        .values()
        .to_vec()
}

/// Probe that replays fixed readings, then reads `fallback`.
#[derive(Debug)]
pub struct ScriptedProbe {
    readings: Mutex<VecDeque<f64>>,
    fallback: f64,
}

impl ScriptedProbe {
    pub fn new(readings: &[f64], fallback: f64) -> Arc<Self> {
        Arc::new(Self {
            readings: Mutex::new(readings.iter().copied().collect()),
            fallback,
        })
    }

    /// Always reads `mb`.
    pub fn constant(mb: f64) -> Arc<Self> {
        Self::new(&[], mb)
    }
}

impl MemoryProbe for ScriptedProbe {
    fn current_usage_mb(&self) -> f64 {
        self.readings
            .lock()
            .expect("probe lock")
            .pop_front()
            .unwrap_or(self.fallback)
    }
}
