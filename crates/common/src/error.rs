use thiserror::Error;

/// Boxed error returned by caller-supplied per-chunk functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Canonical chunkflow error taxonomy used across crates.
///
/// Classification guidance:
/// - [`ChunkflowError::InvalidInput`]: bad arguments or dataset shapes, never retried
/// - [`ChunkflowError::InvalidConfig`]: a [`crate::RunConfig`] that fails validation
/// - [`ChunkflowError::ProbeFailure`]: no memory-reading strategy worked on this host
/// - [`ChunkflowError::Io`]: raw filesystem failures while writing/reading/removing segments
/// - [`ChunkflowError::Segment`]: segment payloads that cannot be encoded or decoded
/// - [`ChunkflowError::Transform`]: the caller's per-chunk function failed
/// - [`ChunkflowError::Execution`]: combine/merge failures
#[derive(Debug, Error)]
pub enum ChunkflowError {
    /// Invalid argument or unsupported dataset shape.
    ///
    /// Examples:
    /// - chunk size of zero
    /// - non-numeric Arrow array offered as a sequence
    /// - matrix value count that is not `rows * cols`
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Run configuration that cannot drive a chunked run.
    ///
    /// Examples:
    /// - non-finite or non-positive `max_ram_mb`
    /// - non-finite or non-positive `target_fraction`
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// All process-memory reading strategies failed.
    ///
    /// Only surfaced by the fallible probe entry point; the degrading probe
    /// reads `0.0` instead, which disables threshold-driven spills.
    #[error("memory probe failed: {0}")]
    ProbeFailure(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Segment encode/decode failures.
    ///
    /// Examples:
    /// - bad magic or truncated segment file
    /// - Arrow IPC stream errors
    #[error("segment error: {0}")]
    Segment(String),

    /// The caller's per-chunk transform failed. The run is abandoned.
    #[error("transform failed on chunk {chunk}: {source}")]
    Transform {
        /// 1-based index of the failing chunk.
        chunk: usize,
        /// Error reported by the caller.
        #[source]
        source: BoxError,
    },

    /// Combine or merge failures after chunks were produced.
    ///
    /// Examples:
    /// - table schemas differ between two results
    /// - matrices with different column counts
    #[error("execution error: {0}")]
    Execution(String),
}

/// Standard chunkflow result alias.
pub type Result<T> = std::result::Result<T, ChunkflowError>;
