//! On-disk spill segments for chunkflow runs.
//!
//! A run owns one scratch directory. Each spill writes one immutable
//! `segment-NNNN` file holding the buffered results in append order, and
//! rewrites the run's `index.json` manifest. Segments are read back once,
//! in sequence order, during the final merge.

pub mod layout;
pub mod reader;
pub mod record;
pub mod writer;

pub use layout::*;
pub use reader::{decode_segment, SegmentReader};
pub use record::SegmentRecord;
pub use writer::SegmentWriter;
