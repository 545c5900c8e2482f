//! Fixed-length time chunks over an exposure.

use mkid_core::dataset::{merge_ranges, TimeRange};

/// Splits each covered interval into `chunk_time` pieces, dropping the
/// remainder of every interval.
pub fn partition(coverage: &[TimeRange], chunk_time: f64) -> Vec<TimeRange> {
    if !(chunk_time > 0.0) {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    for range in merge_ranges(coverage) {
        let n = (range.duration() / chunk_time).floor() as usize;
        chunks.extend((0..n).map(|k| TimeRange {
            start: range.start + k as f64 * chunk_time,
            stop: range.start + (k + 1) as f64 * chunk_time,
        }));
    }
    chunks
}

/// Index of the chunk holding instant `t`, if any.
pub fn chunk_of(chunks: &[TimeRange], t: f64) -> Option<usize> {
    let idx = chunks.partition_point(|chunk| chunk.start <= t).checked_sub(1)?;
    chunks[idx].contains_time(t).then_some(idx)
}
