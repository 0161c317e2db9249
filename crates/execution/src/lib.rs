//! Datasets and the bounded-memory chunk pipeline pieces.
//!
//! Architecture role:
//! - chunkable dataset shapes and their default combine
//! - deterministic chunk slicing and chunk-size advice
//! - spill buffer with on-disk segments and the ordered merge back
//!
//! Key modules:
//! - [`dataset`]
//! - [`chunk`]
//! - [`advisor`]
//! - [`spill`]
//! - [`combine`]
//!
//! Feature flags:
//! - no crate-level flags; the allocator trim after a spill is only compiled on glibc Linux.

pub mod advisor;
pub mod chunk;
mod codec;
pub mod combine;
pub mod dataset;
pub mod matrix;
pub mod spill;

// Re-export only what you want at the crate root (no globs).
pub use advisor::{advise_chunk_size, optimal_chunk_size, DEFAULT_TARGET_FRACTION};
pub use chunk::{chunk_bounds, Chunk, ChunkIterator, ChunkRange};
pub use combine::Combiner;
pub use dataset::{Dataset, DatasetKind, Sliceable};
pub use matrix::Matrix;
pub use spill::{SpillManager, SpillReason, DEFAULT_BATCH_LIMIT};
