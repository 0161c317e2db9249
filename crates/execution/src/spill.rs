//! Bounded result buffer backed by on-disk segments.
//!
//! Results are appended to an in-memory buffer. After every append the
//! process memory probe is read; when usage exceeds the threshold, or the
//! buffer grows past the batch limit, the whole buffer is written as the next
//! segment of the run directory and cleared. Segments are immutable once
//! written and are removed either while merging or by [`SpillManager::cleanup`].

use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chunkflow_common::{global_metrics, MemoryProbe, Result, RunId, SegmentSeq};
use chunkflow_segment::{
    run_dir, RunIndex, SegmentMeta, SegmentReader, SegmentRecord, SegmentWriter,
};
use tracing::{debug, info, warn};

use crate::combine::Combiner;
use crate::dataset::Dataset;

/// Buffered results that trigger a spill once exceeded.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// What caused a segment to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpillReason {
    /// Process memory above the threshold.
    Memory,
    /// Buffer longer than the batch limit.
    BatchLimit,
    /// Explicit [`SpillManager::spill`] call.
    Forced,
}

impl SpillReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpillReason::Memory => "memory",
            SpillReason::BatchLimit => "batch_limit",
            SpillReason::Forced => "forced",
        }
    }
}

/// Owns one run's result buffer and scratch directory.
pub struct SpillManager<T: SegmentRecord> {
    run_id: RunId,
    run_dir: PathBuf,
    writer: SegmentWriter,
    reader: SegmentReader,
    buffer: Vec<T>,
    segments: Vec<SegmentMeta>,
    threshold_mb: f64,
    batch_limit: usize,
    probe: Arc<dyn MemoryProbe>,
    segments_written: usize,
}

impl<T: SegmentRecord> SpillManager<T> {
    /// Manager for a fresh run whose scratch directory lives under `scratch_parent`.
    ///
    /// The directory is created on the first spill.
    pub fn new(
        scratch_parent: impl AsRef<Path>,
        threshold_mb: f64,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        let run_id = RunId::generate();
        let dir = run_dir(scratch_parent.as_ref(), &run_id);
        Self {
            run_id,
            writer: SegmentWriter::new(&dir),
            reader: SegmentReader::new(&dir),
            run_dir: dir,
            buffer: Vec::new(),
            segments: Vec::new(),
            threshold_mb,
            batch_limit: DEFAULT_BATCH_LIMIT,
            probe,
            segments_written: 0,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// This run's scratch directory. May not exist yet.
    pub fn scratch_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Results currently held in memory.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Segments written and not yet merged.
    pub fn segments(&self) -> &[SegmentMeta] {
        &self.segments
    }

    /// Segments written over the whole run, merged or not.
    pub fn segments_written(&self) -> usize {
        self.segments_written
    }

    /// Append `result`, then spill the buffer if memory or length demand it.
    ///
    /// A failed spill is returned as an error and leaves the buffer intact.
    pub fn add(&mut self, result: T) -> Result<()> {
        self.buffer.push(result);

        let usage_mb = self.probe.current_usage_mb();
        let reason = if usage_mb > self.threshold_mb {
            Some(SpillReason::Memory)
        } else if self.buffer.len() > self.batch_limit {
            Some(SpillReason::BatchLimit)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                debug!(
                    run_id = %self.run_id,
                    usage_mb,
                    threshold_mb = self.threshold_mb,
                    buffered = self.buffer.len(),
                    reason = reason.as_str(),
                    "spill triggered"
                );
                self.spill_buffer(reason)
            }
            None => Ok(()),
        }
    }

    /// Write the buffer as a segment regardless of memory usage.
    ///
    /// Does nothing when the buffer is empty.
    pub fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.spill_buffer(SpillReason::Forced)
    }

    fn spill_buffer(&mut self, reason: SpillReason) -> Result<()> {
        let started = Instant::now();
        let seq = SegmentSeq(self.segments_written as u32 + 1);
        let meta = self.writer.write_segment(seq, &self.buffer)?;

        self.buffer.clear();
        self.buffer.shrink_to_fit();
        release_memory_hint();

        self.segments.push(meta.clone());
        self.segments_written += 1;
        self.writer.write_index(&RunIndex {
            run_id: self.run_id,
            segments: self.segments.clone(),
        })?;

        let secs = started.elapsed().as_secs_f64();
        global_metrics().record_spill(reason.as_str(), meta.bytes, secs);
        info!(
            run_id = %self.run_id,
            segment = %meta.seq,
            rows = meta.rows,
            bytes = meta.bytes,
            secs,
            reason = reason.as_str(),
            "spilled buffer to disk"
        );
        Ok(())
    }

    /// Combine every segment (oldest first) and then the buffer with `combine`.
    ///
    /// Consumes the material: a second call returns `None`.
    pub fn merge<F>(&mut self, combine: F) -> Result<Option<T>>
    where
        F: FnMut(T, T) -> Result<T>,
    {
        let segments = mem::take(&mut self.segments);
        let buffer = mem::take(&mut self.buffer);
        let merged = segments.len() as u64;

        let out = Combiner::new(combine).merge(&self.reader, segments, buffer)?;
        if merged > 0 {
            // every listed segment has been read back and removed
            self.writer.write_index(&RunIndex {
                run_id: self.run_id,
                segments: Vec::new(),
            })?;
            global_metrics().record_segments_merged(merged);
            info!(run_id = %self.run_id, segments = merged, "merged spilled segments");
        }
        Ok(out)
    }

    /// Drop buffered results and remove the scratch directory.
    ///
    /// Safe to call repeatedly and when nothing was ever spilled.
    pub fn cleanup(&mut self) -> Result<()> {
        self.buffer.clear();
        self.segments.clear();
        match fs::remove_dir_all(&self.run_dir) {
            Ok(()) => {
                debug!(run_id = %self.run_id, dir = %self.run_dir.display(), "scratch directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SpillManager<Dataset> {
    /// [`SpillManager::merge`] with the dataset's own append semantics.
    pub fn get_results(&mut self) -> Result<Option<Dataset>> {
        self.merge(Dataset::concat)
    }
}

impl<T: SegmentRecord> Drop for SpillManager<T> {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!(run_id = %self.run_id, error = %e, "scratch directory cleanup failed");
        }
    }
}

/// Ask the allocator to return freed pages to the OS.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn release_memory_hint() {
    // SAFETY: malloc_trim only inspects allocator-internal state.
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn release_memory_hint() {}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    use arrow::array::Int64Array;
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};
    use chunkflow_common::{ChunkflowError, DegradingProbe, MetricsRegistry};

    use super::*;

    #[derive(Debug)]
    struct ScriptedProbe {
        readings: Mutex<VecDeque<f64>>,
    }

    impl ScriptedProbe {
        fn new(readings: &[f64]) -> Arc<Self> {
            Arc::new(Self {
                readings: Mutex::new(readings.iter().copied().collect()),
            })
        }
    }

    impl MemoryProbe for ScriptedProbe {
        fn current_usage_mb(&self) -> f64 {
            self.readings
                .lock()
                .expect("probe lock")
                .pop_front()
                .unwrap_or(0.0)
        }
    }

    fn unique_parent(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("chunkflow_spill_{name}_{nanos}"))
    }

    fn table(from: i64, to: i64) -> Dataset {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from_iter_values(from..=to))])
                .expect("batch");
        Dataset::Table(batch)
    }

    #[test]
    fn memory_spill_keeps_insertion_order() {
        let parent = unique_parent("order");
        let mut mgr = SpillManager::new(&parent, 50.0, ScriptedProbe::new(&[0.0, 100.0, 0.0]));

        mgr.add(table(1, 10)).expect("add 1");
        assert_eq!(mgr.segments_written(), 0);
        mgr.add(table(11, 20)).expect("add 2");
        assert_eq!(mgr.segments_written(), 1);
        assert_eq!(mgr.buffered(), 0);
        mgr.add(table(21, 30)).expect("add 3");
        assert_eq!(mgr.segments_written(), 1);
        assert_eq!(mgr.buffered(), 1);

        let index = SegmentReader::new(mgr.scratch_dir())
            .read_index()
            .expect("index");
        assert_eq!(index.run_id, *mgr.run_id());
        assert_eq!(index.segments.len(), 1);
        assert_eq!(index.segments[0].file, "segment-0001");
        assert_eq!(index.segments[0].records, 2);
        assert_eq!(index.segments[0].rows, 20);

        let merged = mgr.get_results().expect("merge").expect("non-empty");
        assert_eq!(merged, table(1, 30));
        assert!(!mgr.scratch_dir().join("segment-0001").exists());
        let index = SegmentReader::new(mgr.scratch_dir())
            .read_index()
            .expect("index after merge");
        assert!(index.segments.is_empty());

        mgr.cleanup().expect("cleanup");
        assert!(!mgr.scratch_dir().exists());
        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn batch_limit_spills_in_sequence() {
        let parent = unique_parent("batch");
        let mut mgr: SpillManager<Dataset> =
            SpillManager::new(&parent, f64::MAX, ScriptedProbe::new(&[])).with_batch_limit(2);
        for i in 0..7 {
            mgr.add(Dataset::Sequence(vec![f64::from(i)])).expect("add");
        }
        // spills after the 3rd and 6th result
        let files: Vec<String> = mgr.segments().iter().map(|m| m.file.clone()).collect();
        assert_eq!(files, vec!["segment-0001", "segment-0002"]);
        assert_eq!(mgr.buffered(), 1);

        let merged = mgr.get_results().expect("merge");
        assert_eq!(
            merged,
            Some(Dataset::Sequence((0..7).map(f64::from).collect()))
        );
        assert_eq!(mgr.segments_written(), 2);
        drop(mgr);
        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn cleanup_discards_everything() {
        let parent = unique_parent("cleanup");
        let mut mgr = SpillManager::new(&parent, 0.0, ScriptedProbe::new(&[1.0, 0.0]))
            .with_batch_limit(100);
        mgr.add(Dataset::Sequence(vec![1.0])).expect("add");
        mgr.add(Dataset::Sequence(vec![2.0])).expect("add");
        assert!(mgr.scratch_dir().exists());

        mgr.cleanup().expect("cleanup");
        mgr.cleanup().expect("second cleanup");
        assert!(!mgr.scratch_dir().exists());
        assert_eq!(mgr.get_results().expect("merge"), None);
        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn failed_spill_keeps_buffer() {
        let parent = unique_parent("blocked");
        fs::write(&parent, b"not a directory").expect("blocker file");

        let mut mgr = SpillManager::new(&parent, 0.0, ScriptedProbe::new(&[1.0]));
        let err = mgr.add(Dataset::Sequence(vec![4.0])).expect_err("spill must fail");
        assert!(matches!(err, ChunkflowError::Io(_)));
        assert_eq!(mgr.buffered(), 1);
        assert_eq!(mgr.segments_written(), 0);

        assert_eq!(
            mgr.get_results().expect("merge"),
            Some(Dataset::Sequence(vec![4.0]))
        );
        drop(mgr);
        let _ = fs::remove_file(&parent);
    }

    #[test]
    fn drop_removes_scratch_dir() {
        let parent = unique_parent("drop");
        let dir = {
            let mut mgr = SpillManager::new(&parent, f64::MAX, ScriptedProbe::new(&[]));
            mgr.add(Dataset::Sequence(vec![1.0])).expect("add");
            mgr.spill().expect("forced spill");
            assert_eq!(mgr.segments_written(), 1);
            mgr.scratch_dir().to_path_buf()
        };
        assert!(!dir.exists());
        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn forced_spill_of_empty_buffer_is_noop() {
        let parent = unique_parent("noop");
        let mut mgr: SpillManager<Dataset> =
            SpillManager::new(&parent, f64::MAX, ScriptedProbe::new(&[]));
        mgr.spill().expect("spill");
        assert_eq!(mgr.segments_written(), 0);
        assert!(!mgr.scratch_dir().exists());
        assert_eq!(mgr.get_results().expect("merge"), None);
    }

    #[test]
    fn unreadable_memory_never_triggers_memory_spill() {
        let parent = unique_parent("unreadable");
        let memory = Arc::new(DegradingProbe::with_metrics(
            || Err(ChunkflowError::ProbeFailure("no memory source".to_string())),
            MetricsRegistry::new(),
        ));
        let mut mgr = SpillManager::new(&parent, 0.0, memory).with_batch_limit(100);
        for i in 0..10 {
            mgr.add(Dataset::Sequence(vec![f64::from(i)])).expect("add");
        }
        assert_eq!(mgr.segments_written(), 0);
        assert_eq!(mgr.buffered(), 10);
        assert!(!mgr.scratch_dir().exists());
        assert_eq!(
            mgr.get_results().expect("merge"),
            Some(Dataset::Sequence((0..10).map(f64::from).collect()))
        );
    }

    #[test]
    fn spill_reasons_have_metric_labels() {
        assert_eq!(SpillReason::Memory.as_str(), "memory");
        assert_eq!(SpillReason::BatchLimit.as_str(), "batch_limit");
        assert_eq!(SpillReason::Forced.as_str(), "forced");
    }
}
