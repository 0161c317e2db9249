//! Chunk-size advice from a memory budget.

use crate::dataset::Dataset;

/// Share of the memory budget one chunk should occupy by default.
pub const DEFAULT_TARGET_FRACTION: f64 = 0.1;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Rows per chunk so that one chunk takes about `target_fraction` of `max_ram_mb`.
///
/// `floor(total_rows * max_ram_mb * target_fraction / data_size_mb)`, clamped
/// to `[1, total_rows]`. Degenerate inputs are clamped rather than rejected:
/// a NaN result gives `1`, an infinite one gives `total_rows`, and an empty
/// dataset gives `1`.
pub fn optimal_chunk_size(
    data_size_mb: f64,
    total_rows: usize,
    max_ram_mb: f64,
    target_fraction: f64,
) -> usize {
    let upper = total_rows.max(1);
    let target_chunk_mb = max_ram_mb * target_fraction;
    let raw = total_rows as f64 * target_chunk_mb / data_size_mb;
    if raw.is_nan() || raw < 1.0 {
        return 1;
    }
    if raw >= upper as f64 {
        return upper;
    }
    (raw.floor() as usize).clamp(1, upper)
}

/// [`optimal_chunk_size`] for `dataset`, sized from its estimated footprint.
pub fn advise_chunk_size(dataset: &Dataset, max_ram_mb: f64, target_fraction: f64) -> usize {
    let data_size_mb = dataset.estimated_bytes() as f64 / BYTES_PER_MB;
    optimal_chunk_size(data_size_mb, dataset.len(), max_ram_mb, target_fraction)
}
