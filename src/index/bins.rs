//! Hierarchical binning of 1-D intervals.
//!
//! Bin 0 spans the full 512 Mbp coordinate space. Every level below splits each
//! parent into 8 children, down to 16 Kbp bins at the finest level:
//!
//! | level | bins  | width   | first id |
//! |-------|-------|---------|----------|
//! | 0     | 1     | 512 Mbp | 0        |
//! | 1     | 8     | 64 Mbp  | 1        |
//! | 2     | 64    | 8 Mbp   | 9        |
//! | 3     | 512   | 1 Mbp   | 73       |
//! | 4     | 4096  | 128 Kbp | 585      |
//! | 5     | 32768 | 16 Kbp  | 4681     |

/// Bit shift of the finest bin width
pub const MIN_SHIFT: u32 = 14;

/// Number of levels below the root bin
pub const DEPTH: u32 = 5;

/// Exclusive upper bound of representable coordinates (2^29)
pub const MAX_COORDINATE: u64 = 1 << (MIN_SHIFT + 3 * DEPTH);

/// Number of distinct bin identifiers
pub const NUM_BINS: u32 = ((1 << (3 * (DEPTH + 1))) - 1) / 7;

/// Bit shift of the linear index window width
pub const WINDOW_SHIFT: u32 = 14;

/// Width of a linear index window
pub const WINDOW_SIZE: u64 = 1 << WINDOW_SHIFT;

/// First bin identifier of `level`
#[must_use]
pub const fn level_offset(level: u32) -> u32 {
    ((1 << (3 * level)) - 1) / 7
}

/// Bit shift of the bin width at `level`
#[must_use]
pub const fn level_shift(level: u32) -> u32 {
    MIN_SHIFT + 3 * (DEPTH - level)
}

/// Returns the smallest bin fully containing `[start, end)`
///
/// The interval must be non-empty and end at or before [`MAX_COORDINATE`].
#[must_use]
pub fn bin_of(start: u64, end: u64) -> u32 {
    debug_assert!(start < end && end <= MAX_COORDINATE);
    let last = end - 1;
    for level in (1..=DEPTH).rev() {
        let shift = level_shift(level);
        if start >> shift == last >> shift {
            return level_offset(level) + (start >> shift) as u32;
        }
    }
    0
}

/// Returns, in ascending order, every bin whose span intersects `[start, end)`
///
/// Ends past [`MAX_COORDINATE`] are clamped.
#[must_use]
pub fn bins_overlapping(start: u64, end: u64) -> Vec<u32> {
    let end = end.min(MAX_COORDINATE);
    if start >= end {
        return Vec::new();
    }
    let last = end - 1;
    let mut bins = vec![0];
    for level in 1..=DEPTH {
        let shift = level_shift(level);
        let offset = level_offset(level);
        bins.extend((start >> shift) as u32 + offset..=(last >> shift) as u32 + offset);
    }
    bins
}

/// Returns the level a bin belongs to
#[must_use]
pub fn bin_level(bin: u32) -> u32 {
    (0..=DEPTH)
        .rev()
        .find(|&level| bin >= level_offset(level))
        .unwrap_or(0)
}

/// Returns the half-open coordinate span covered by a bin
#[must_use]
pub fn bin_span(bin: u32) -> (u64, u64) {
    let level = bin_level(bin);
    let shift = level_shift(level);
    let start = u64::from(bin - level_offset(level)) << shift;
    (start, start + (1 << shift))
}

/// Linear index window containing `position`
#[must_use]
pub fn window_of(position: u64) -> usize {
    (position >> WINDOW_SHIFT) as usize
}

#[cfg(test)]
mod testing {
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(MAX_COORDINATE, 512 * 1024 * 1024);
        assert_eq!(NUM_BINS, 37_449);
        assert_eq!(level_offset(5), 4681);
        assert_eq!(level_offset(4), 585);
        assert_eq!(level_shift(0), 29);
        assert_eq!(level_shift(5), 14);
    }

    #[test]
    fn test_bin_of_levels() {
        assert_eq!(bin_of(0, 1), 4681);
        assert_eq!(bin_of(0, 16_384), 4681);
        assert_eq!(bin_of(16_384, 16_385), 4682);
        assert_eq!(bin_of(0, 16_385), 585);
        assert_eq!(bin_of(0, 1 << 17), 585);
        assert_eq!(bin_of(0, (1 << 17) + 1), 73);
        assert_eq!(bin_of(0, MAX_COORDINATE), 0);
        assert_eq!(bin_of(1737, 2090), 4681);
    }

    #[test]
    fn test_bins_overlapping_small_region() {
        let bins = bins_overlapping(1000, 2000);
        assert_eq!(bins, vec![0, 1, 9, 73, 585, 4681]);
    }

    #[test]
    fn test_bins_overlapping_sorted_and_clamped() {
        let bins = bins_overlapping(0, u64::MAX);
        assert_eq!(bins.len(), NUM_BINS as usize);
        assert!(bins.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_bins_overlapping_empty() {
        assert!(bins_overlapping(10, 10).is_empty());
        assert!(bins_overlapping(MAX_COORDINATE, MAX_COORDINATE + 10).is_empty());
    }

    #[test]
    fn test_bin_span() {
        assert_eq!(bin_span(0), (0, MAX_COORDINATE));
        assert_eq!(bin_span(4681), (0, 16_384));
        assert_eq!(bin_span(4682), (16_384, 32_768));
        assert_eq!(bin_span(2), (1 << 26, 2 << 26));
    }

    #[test]
    fn test_bin_of_contains_interval() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..10_000 {
            let start = rng.random_range(0..MAX_COORDINATE - 1);
            let scale: u32 = rng.random_range(0..20);
            let len = rng.random_range(1..=(1u64 << scale));
            let end = (start + len).min(MAX_COORDINATE);
            let (bin_start, bin_end) = bin_span(bin_of(start, end));
            assert!(bin_start <= start && end <= bin_end);
        }
    }

    #[test]
    fn test_query_bins_cover_every_overlapping_record_bin() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..2_000 {
            let q_start = rng.random_range(0..1u64 << 22);
            let q_end = q_start + rng.random_range(1..1u64 << 18);
            let candidates = bins_overlapping(q_start, q_end);

            let r_start = rng.random_range(0..1u64 << 22);
            let r_end = r_start + rng.random_range(1..1u64 << 18);
            if r_start < q_end && q_start < r_end {
                assert!(candidates.binary_search(&bin_of(r_start, r_end)).is_ok());
            }
        }
    }
}
