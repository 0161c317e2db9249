//! Process and host memory probing.
//!
//! Readings are comparative, not exact: the spill manager compares them
//! against a threshold and nothing else. Strategy per platform:
//! - Unix: `VmRSS` from `/proc/self/status`, falling back to `getrusage`
//!   peak RSS (KB on Linux, bytes on Apple targets).
//! - Windows: the process working set as reported by the OS.
//!
//! Known limitation: when every strategy fails [`DegradingProbe`] reads
//! `0.0`, so a threshold check never fires and only the batch limit
//! bounds the in-memory buffer. A warning is logged once per probe.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::warn;

use crate::error::{ChunkflowError, Result};
use crate::metrics::{global_metrics, MetricsRegistry};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Source of current-process memory readings, in MB.
pub trait MemoryProbe: Send + Sync + fmt::Debug {
    /// Current memory footprint of this process. Never fails; `0.0` means unknown.
    fn current_usage_mb(&self) -> f64;
}

/// Infallible probe over a fallible reading.
///
/// A failed reading counts as `0.0`, bumps `chunkflow_probe_failures_total`
/// and logs a warning the first time only. Successful readings update the
/// `chunkflow_probe_usage_mb` gauge.
pub struct DegradingProbe<F> {
    source: F,
    warned: AtomicBool,
    metrics: MetricsRegistry,
}

impl<F> DegradingProbe<F>
where
    F: Fn() -> Result<f64> + Send + Sync,
{
    /// Wrap `source`, reporting into the process-wide registry.
    pub fn new(source: F) -> Self {
        Self::with_metrics(source, global_metrics().clone())
    }

    pub fn with_metrics(source: F, metrics: MetricsRegistry) -> Self {
        Self {
            source,
            warned: AtomicBool::new(false),
            metrics,
        }
    }

    /// Fallible reading straight from the source.
    pub fn try_current_usage_mb(&self) -> Result<f64> {
        (self.source)()
    }
}

impl<F> fmt::Debug for DegradingProbe<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DegradingProbe")
            .field("warned", &self.warned.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<F> MemoryProbe for DegradingProbe<F>
where
    F: Fn() -> Result<f64> + Send + Sync,
{
    fn current_usage_mb(&self) -> f64 {
        match (self.source)() {
            Ok(mb) => {
                self.metrics.set_probe_usage_mb(mb);
                mb
            }
            Err(e) => {
                self.metrics.inc_probe_failures();
                if !self.warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        error = %e,
                        "memory probe unavailable; usage reads as 0.0 and threshold spills are disabled"
                    );
                }
                0.0
            }
        }
    }
}

/// Probe backed by the operating system.
#[derive(Debug)]
pub struct ProcessMemoryProbe {
    inner: DegradingProbe<fn() -> Result<f64>>,
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self {
            inner: DegradingProbe::new(process_usage_mb as fn() -> Result<f64>),
        }
    }
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fallible reading; surfaces [`ChunkflowError::ProbeFailure`].
    pub fn try_current_usage_mb(&self) -> Result<f64> {
        self.inner.try_current_usage_mb()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn current_usage_mb(&self) -> f64 {
        self.inner.current_usage_mb()
    }
}

/// Read the resident memory of the current process in MB.
pub fn process_usage_mb() -> Result<f64> {
    platform::process_usage_mb()
}

/// `true` when the probe reports more than `max_ram_mb`.
pub fn ram_threshold_exceeded(probe: &dyn MemoryProbe, max_ram_mb: f64) -> bool {
    probe.current_usage_mb() > max_ram_mb
}

/// Host memory snapshot for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemMemoryInfo {
    /// Physical memory installed.
    pub total_ram_mb: f64,
    /// Physical memory currently available.
    pub available_ram_mb: f64,
    /// Memory used by this process.
    pub used_ram_mb: f64,
}

/// Snapshot host and process memory. Unreadable values are reported as `0.0`.
pub fn system_info() -> SystemMemoryInfo {
    let (total_ram_mb, available_ram_mb) = platform::host_memory_mb().unwrap_or_else(|e| {
        warn!(error = %e, "host memory query failed");
        (0.0, 0.0)
    });
    SystemMemoryInfo {
        total_ram_mb,
        available_ram_mb,
        used_ram_mb: ProcessMemoryProbe::new().current_usage_mb(),
    }
}

/// Extract `VmRSS` (reported in kB) from a `/proc/<pid>/status` document.
pub fn parse_vm_rss_mb(status: &str) -> Option<f64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<f64>().ok())
        .map(|kb| kb / 1024.0)
}

#[cfg(unix)]
mod platform {
    use tracing::debug;

    use super::{parse_vm_rss_mb, ChunkflowError, Result};

    pub(super) fn process_usage_mb() -> Result<f64> {
        match proc_status_rss_mb() {
            Ok(mb) => Ok(mb),
            Err(e) => {
                debug!(error = %e, "VmRSS unavailable, falling back to getrusage");
                rusage_max_rss_mb()
            }
        }
    }

    fn proc_status_rss_mb() -> Result<f64> {
        let status = std::fs::read_to_string("/proc/self/status")?;
        parse_vm_rss_mb(&status).ok_or_else(|| {
            ChunkflowError::ProbeFailure("VmRSS missing from /proc/self/status".to_string())
        })
    }

    fn rusage_max_rss_mb() -> Result<f64> {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
        // SAFETY: getrusage only writes into the struct we hand it.
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
        if rc != 0 {
            return Err(ChunkflowError::ProbeFailure(format!(
                "getrusage failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        // SAFETY: zero-initialised and filled by a successful getrusage call.
        let usage = unsafe { usage.assume_init() };
        let max_rss = usage.ru_maxrss as f64;
        if max_rss <= 0.0 {
            return Err(ChunkflowError::ProbeFailure(
                "getrusage reported no resident set".to_string(),
            ));
        }
        Ok(rusage_to_mb(max_rss))
    }

    #[cfg(target_vendor = "apple")]
    pub(super) fn rusage_to_mb(raw: f64) -> f64 {
        raw / super::BYTES_PER_MB
    }

    #[cfg(not(target_vendor = "apple"))]
    pub(super) fn rusage_to_mb(raw: f64) -> f64 {
        raw / 1024.0
    }

    #[cfg(target_os = "linux")]
    pub(super) fn host_memory_mb() -> Result<(f64, f64)> {
        let page_size = sysconf(libc::_SC_PAGESIZE)?;
        let pages = sysconf(libc::_SC_PHYS_PAGES)?;
        let avail_pages = sysconf(libc::_SC_AVPHYS_PAGES)?;
        Ok((
            pages * page_size / super::BYTES_PER_MB,
            avail_pages * page_size / super::BYTES_PER_MB,
        ))
    }

    #[cfg(target_os = "linux")]
    fn sysconf(name: libc::c_int) -> Result<f64> {
        // SAFETY: sysconf has no memory-safety preconditions.
        let v = unsafe { libc::sysconf(name) };
        if v < 0 {
            return Err(ChunkflowError::ProbeFailure(format!(
                "sysconf({name}) failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(v as f64)
    }

    #[cfg(not(target_os = "linux"))]
    pub(super) fn host_memory_mb() -> Result<(f64, f64)> {
        super::sysinfo_host_memory_mb()
    }
}

#[cfg(windows)]
mod platform {
    use super::{ChunkflowError, Result, BYTES_PER_MB};

    pub(super) fn process_usage_mb() -> Result<f64> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| ChunkflowError::ProbeFailure(format!("current pid: {e}")))?;
        let mut sys = sysinfo::System::new();
        sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid)
            .map(|p| p.memory() as f64 / BYTES_PER_MB)
            .filter(|mb| *mb > 0.0)
            .ok_or_else(|| {
                ChunkflowError::ProbeFailure("process memory info unavailable".to_string())
            })
    }

    pub(super) fn host_memory_mb() -> Result<(f64, f64)> {
        super::sysinfo_host_memory_mb()
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use super::{ChunkflowError, Result};

    pub(super) fn process_usage_mb() -> Result<f64> {
        Err(ChunkflowError::ProbeFailure(
            "no process memory source on this platform".to_string(),
        ))
    }

    pub(super) fn host_memory_mb() -> Result<(f64, f64)> {
        super::sysinfo_host_memory_mb()
    }
}

#[cfg(not(target_os = "linux"))]
fn sysinfo_host_memory_mb() -> Result<(f64, f64)> {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        return Err(ChunkflowError::ProbeFailure(
            "host memory totals unavailable".to_string(),
        ));
    }
    Ok((
        total as f64 / BYTES_PER_MB,
        sys.available_memory() as f64 / BYTES_PER_MB,
    ))
}
