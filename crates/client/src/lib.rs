//! Bounded-memory chunked processing.
//!
//! A [`Dataset`] is cut into ordered chunks, each chunk is handed to a caller
//! function, and the per-chunk results are buffered, spilled to disk under
//! memory pressure, and finally combined oldest first into one result.
//!
//! Architecture role:
//! - public entry points [`process_with_chunks`] and [`ChunkedRun`]
//! - re-exports the dataset, configuration and error types callers need
//!
//! Key modules:
//! - [`runner`]
//! - [`parquet_input`]

pub mod parquet_input;
pub mod runner;

pub use chunkflow_common::{
    global_metrics, system_info, BoxError, ChunkflowError, DegradingProbe, MemoryProbe,
    MetricsRegistry, ProcessMemoryProbe, Result, RunConfig, RunId, SystemMemoryInfo,
};
pub use chunkflow_execution::{
    optimal_chunk_size, Chunk, ChunkIterator, ChunkRange, Dataset, DatasetKind, Matrix,
};
pub use parquet_input::read_parquet_table;
pub use runner::{process_with_chunks, ChunkedRun, RunOutput};
