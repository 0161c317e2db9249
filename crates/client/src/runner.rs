use std::sync::Arc;
use std::time::Instant;

use chunkflow_common::{
    global_metrics, BoxError, ChunkflowError, MemoryProbe, ProcessMemoryProbe, Result, RunConfig,
    RunId,
};
use chunkflow_execution::{advise_chunk_size, Chunk, ChunkIterator, Dataset, SpillManager};
use chunkflow_segment::SegmentRecord;
use tracing::{debug, info, warn};

/// Outcome of a chunked run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput<T> {
    /// Combined result; `None` when the dataset produced no chunks.
    pub result: Option<T>,
    pub run_id: RunId,
    /// Chunk size used, whether configured or advised.
    pub chunk_size: usize,
    /// Chunks transformed.
    pub chunks: usize,
    /// Segments spilled to disk over the run.
    pub segments_written: usize,
}

/// Entry point for chunked processing of one dataset at a time.
#[derive(Debug, Clone)]
pub struct ChunkedRun {
    config: RunConfig,
    probe: Arc<dyn MemoryProbe>,
}

impl ChunkedRun {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            probe: Arc::new(ProcessMemoryProbe::new()),
        }
    }

    /// Replace the process memory probe used for spill decisions.
    pub fn with_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run `process` over every chunk and combine the results with the
    /// dataset's own append semantics.
    pub fn execute<P, E>(&self, dataset: &Dataset, process: P) -> Result<RunOutput<Dataset>>
    where
        P: FnMut(Chunk) -> std::result::Result<Dataset, E>,
        E: Into<BoxError>,
    {
        self.execute_with_combine(dataset, process, Dataset::concat)
    }

    /// Run `process` over every chunk in order and fold the results with
    /// `combine`, oldest first.
    ///
    /// Chunks are processed one at a time. Each result goes through a
    /// [`SpillManager`] that may move buffered results to disk. The first
    /// failing chunk aborts the run. The scratch directory is removed on
    /// every exit path.
    pub fn execute_with_combine<T, P, E, C>(
        &self,
        dataset: &Dataset,
        mut process: P,
        combine: C,
    ) -> Result<RunOutput<T>>
    where
        T: SegmentRecord,
        P: FnMut(Chunk) -> std::result::Result<T, E>,
        E: Into<BoxError>,
        C: FnMut(T, T) -> Result<T>,
    {
        self.config.validate()?;
        let chunk_size = match self.config.chunk_size {
            Some(size) => size,
            None => advise_chunk_size(
                dataset,
                self.config.max_ram_mb,
                self.config.target_fraction,
            ),
        };
        let mut chunks = ChunkIterator::new(dataset.len(), chunk_size)?;

        let mut spill = SpillManager::new(
            self.config.scratch_parent(),
            self.config.max_ram_mb,
            Arc::clone(&self.probe),
        )
        .with_batch_limit(self.config.batch_limit);
        let run_id = *spill.run_id();
        info!(
            run_id = %run_id,
            kind = %dataset.kind(),
            rows = dataset.len(),
            chunk_size,
            total_chunks = chunks.total_chunks(),
            max_ram_mb = self.config.max_ram_mb,
            "chunked run started"
        );

        let outcome = self.drive(dataset, &mut chunks, &mut spill, &mut process, combine);
        let segments_written = spill.segments_written();
        let cleaned = spill.cleanup();

        let result = match (outcome, cleaned) {
            (Ok(result), Ok(())) => result,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), cleaned) => {
                if let Err(ce) = cleaned {
                    warn!(run_id = %run_id, error = %ce, "scratch cleanup failed after run error");
                }
                warn!(run_id = %run_id, error = %e, "chunked run failed");
                return Err(e);
            }
        };

        info!(
            run_id = %run_id,
            chunks = chunks.current_index(),
            segments_written,
            "chunked run finished"
        );
        Ok(RunOutput {
            result,
            run_id,
            chunk_size,
            chunks: chunks.current_index(),
            segments_written,
        })
    }

    fn drive<T, P, E, C>(
        &self,
        dataset: &Dataset,
        chunks: &mut ChunkIterator,
        spill: &mut SpillManager<T>,
        process: &mut P,
        combine: C,
    ) -> Result<Option<T>>
    where
        T: SegmentRecord,
        P: FnMut(Chunk) -> std::result::Result<T, E>,
        E: Into<BoxError>,
        C: FnMut(T, T) -> Result<T>,
    {
        let metrics = global_metrics();
        let run_label = spill.run_id().to_string();
        let total_chunks = chunks.total_chunks();
        let report_every = (total_chunks / 10).max(1);

        while let Some(range) = chunks.get_next() {
            let chunk = Chunk {
                range,
                total_chunks,
                data: dataset.slice_chunk(&range),
            };
            let started = Instant::now();
            let result = process(chunk).map_err(|e| ChunkflowError::Transform {
                chunk: range.index,
                source: e.into(),
            })?;
            let rows = range.len() as u64;
            let secs = started.elapsed().as_secs_f64();
            metrics.record_chunk(rows, secs);

            if range.index % report_every == 0 || range.index == total_chunks {
                if self.config.verbose {
                    info!(run_id = %run_label, chunk = range.index, total_chunks, rows, secs, "processed chunk");
                } else {
                    debug!(run_id = %run_label, chunk = range.index, total_chunks, rows, secs, "processed chunk");
                }
            }

            spill.add(result)?;
        }

        spill.merge(combine)
    }
}

/// Process `dataset` chunk by chunk under `config` and return the
/// row-appended results, or `None` for an empty dataset.
pub fn process_with_chunks<P, E>(
    dataset: &Dataset,
    config: RunConfig,
    process: P,
) -> Result<Option<Dataset>>
where
    P: FnMut(Chunk) -> std::result::Result<Dataset, E>,
    E: Into<BoxError>,
{
    ChunkedRun::new(config)
        .execute(dataset, process)
        .map(|out| out.result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected_before_processing() {
        let config = RunConfig {
            max_ram_mb: 0.0,
            ..RunConfig::default()
        };
        let mut called = false;
        let err = process_with_chunks(&Dataset::Sequence(vec![1.0]), config, |c| {
            called = true;
            Ok::<_, ChunkflowError>(c.data)
        })
        .expect_err("zero budget");
        assert!(matches!(err, ChunkflowError::InvalidConfig(_)));
        assert!(!called);
    }

    #[test]
    fn advisor_picks_chunk_size_when_unset() {
        let config = RunConfig {
            max_ram_mb: 2.0,
            ..RunConfig::default()
        };
        let data = Dataset::Sequence(vec![1.0; 131_072]);
        let out = ChunkedRun::new(config)
            .execute(&data, |c| Ok::<_, ChunkflowError>(c.data))
            .expect("run");
        assert_eq!(out.chunk_size, 26_214);
        assert_eq!(out.chunks, 6);
        assert_eq!(out.result, Some(data));
    }
}
