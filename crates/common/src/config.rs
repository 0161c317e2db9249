use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ChunkflowError, Result};

/// Knobs for one chunked run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Process memory threshold (MB) that triggers a spill; also the advisor budget.
    pub max_ram_mb: f64,
    /// Fixed chunk size in rows/elements. `None` asks the advisor.
    pub chunk_size: Option<usize>,
    /// Parent directory for the per-run scratch dir. `None` uses the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    /// Spill once more than this many results are buffered.
    pub batch_limit: usize,
    /// Share of `max_ram_mb` one chunk should occupy.
    pub target_fraction: f64,
    /// Report progress at info level.
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_ram_mb: 1024.0,
            chunk_size: None,
            scratch_dir: None,
            batch_limit: 50,
            target_fraction: 0.1,
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `CHUNKFLOW_*` environment variables.
    ///
    /// Values that do not parse are ignored.
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Some(v) = std::env::var("CHUNKFLOW_MAX_RAM_MB")
            .ok()
            .and_then(|x| x.parse::<f64>().ok())
        {
            c.max_ram_mb = v;
        }
        if let Some(v) = std::env::var("CHUNKFLOW_CHUNK_SIZE")
            .ok()
            .and_then(|x| x.parse::<usize>().ok())
        {
            c.chunk_size = Some(v);
        }
        if let Some(v) = std::env::var_os("CHUNKFLOW_SCRATCH_DIR").filter(|x| !x.is_empty()) {
            c.scratch_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = std::env::var("CHUNKFLOW_BATCH_LIMIT")
            .ok()
            .and_then(|x| x.parse::<usize>().ok())
        {
            c.batch_limit = v;
        }
        if let Some(v) = std::env::var("CHUNKFLOW_TARGET_FRACTION")
            .ok()
            .and_then(|x| x.parse::<f64>().ok())
        {
            c.target_fraction = v;
        }
        if let Some(v) = std::env::var("CHUNKFLOW_VERBOSE")
            .ok()
            .and_then(|x| parse_flag(&x))
        {
            c.verbose = v;
        }
        c
    }

    /// Reject budgets the advisor and spill threshold cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.max_ram_mb.is_finite() || self.max_ram_mb <= 0.0 {
            return Err(ChunkflowError::InvalidConfig(format!(
                "max_ram_mb must be a positive finite number, got {}",
                self.max_ram_mb
            )));
        }
        if !self.target_fraction.is_finite() || self.target_fraction <= 0.0 {
            return Err(ChunkflowError::InvalidConfig(format!(
                "target_fraction must be a positive finite number, got {}",
                self.target_fraction
            )));
        }
        Ok(())
    }

    /// Directory under which the per-run scratch dir is created.
    pub fn scratch_parent(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
