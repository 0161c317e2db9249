use chunkflow_common::Result;

/// A buffered result that can be written into, and read back from, a segment.
///
/// Encodings only need to round-trip within one process run; they are not a
/// stable interchange format.
pub trait SegmentRecord: Sized {
    /// Append the encoded form of `self` to `out`.
    fn encode(&self, out: &mut Vec<u8>) -> Result<()>;

    /// Rebuild a record from exactly the bytes `encode` produced.
    fn decode(bytes: &[u8]) -> Result<Self>;

    /// Rows/elements carried by this record, for bookkeeping.
    fn rows(&self) -> usize {
        1
    }
}
