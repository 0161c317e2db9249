//! Shared configuration, error types, IDs, memory probing and metrics for chunkflow crates.
//!
//! Architecture role:
//! - defines the run configuration passed from the client down to the spill manager
//! - provides common [`ChunkflowError`] / [`Result`] contracts
//! - reads process and host memory for spill decisions and diagnostics
//! - hosts the Prometheus metrics registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`memory`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod memory;
pub mod metrics;

pub use config::RunConfig;
pub use error::{BoxError, ChunkflowError, Result};
pub use ids::*;
pub use memory::{
    process_usage_mb, ram_threshold_exceeded, system_info, DegradingProbe, MemoryProbe,
    ProcessMemoryProbe, SystemMemoryInfo,
};
pub use metrics::{global_metrics, MetricsRegistry};
