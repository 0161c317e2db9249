use std::fs::File;
use std::path::Path;

use arrow::compute::concat_batches;
use chunkflow_common::{ChunkflowError, Result};
use chunkflow_execution::Dataset;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

/// Load a whole Parquet file as one table dataset.
pub fn read_parquet_table(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| ChunkflowError::InvalidInput(format!("parquet reader build failed: {e}")))?;
    let schema = builder.schema().clone();
    let reader = builder
        .build()
        .map_err(|e| ChunkflowError::InvalidInput(format!("parquet reader open failed: {e}")))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ChunkflowError::InvalidInput(format!("parquet decode failed: {e}")))?;
    debug!(path = %path.display(), batches = batches.len(), "parquet file loaded");

    concat_batches(&schema, &batches)
        .map(Dataset::Table)
        .map_err(|e| ChunkflowError::Execution(format!("parquet batch concat failed: {e}")))
}
