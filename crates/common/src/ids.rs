//! Typed identifiers shared across spill/merge components.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

static NEXT_RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identifier of one chunked run, unique within a host at a point in time.
///
/// Rendered as `{started_nanos}-{pid}-{seq}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    /// Wall-clock start time in nanoseconds since the Unix epoch.
    pub started_nanos: u128,
    /// Owning process id.
    pub pid: u32,
    /// Per-process run counter.
    pub seq: u64,
}

impl RunId {
    /// Allocate a fresh id for a run starting now.
    pub fn generate() -> Self {
        let started_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Self {
            started_nanos,
            pid: std::process::id(),
            seq: NEXT_RUN_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.started_nanos, self.pid, self.seq)
    }
}

/// 1-based creation-order number of a spilled segment within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentSeq(
    /// Raw sequence value.
    pub u32,
);

impl fmt::Display for SegmentSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
        assert_eq!(a.pid, std::process::id());
    }

    #[test]
    fn segment_seq_orders_numerically() {
        let mut seqs = vec![SegmentSeq(10), SegmentSeq(2), SegmentSeq(1)];
        seqs.sort();
        assert_eq!(seqs, vec![SegmentSeq(1), SegmentSeq(2), SegmentSeq(10)]);
    }
}
