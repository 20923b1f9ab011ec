use std::fmt;

/// Number of bits used for the within-block offset
const WITHIN_BITS: u32 = 16;

/// Largest compressed offset representable in a virtual offset
pub const MAX_COMPRESSED_OFFSET: u64 = (1 << 48) - 1;

/// A composite seek key into a BGZF stream.
///
/// The upper 48 bits hold the compressed offset of a block, the lower 16 bits the
/// position within that block's decompressed payload. Ordering on the raw value
/// is therefore ordering by block first and within-block position second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);
impl VirtualOffset {
    /// Encodes a virtual offset from a compressed block start and a within-block position
    ///
    /// # Panics
    ///
    /// Panics if `block_start` does not fit in 48 bits
    #[must_use]
    pub fn new(block_start: u64, within_block: u16) -> Self {
        assert!(
            block_start <= MAX_COMPRESSED_OFFSET,
            "compressed offset {block_start} exceeds 48 bits"
        );
        Self((block_start << WITHIN_BITS) | u64::from(within_block))
    }

    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Compressed offset of the block this offset points into
    #[must_use]
    pub fn block_start(self) -> u64 {
        self.0 >> WITHIN_BITS
    }

    /// Position inside the decompressed block
    #[must_use]
    pub fn within_block(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// Decodes into `(block_start, within_block)`
    #[must_use]
    pub fn split(self) -> (u64, u16) {
        (self.block_start(), self.within_block())
    }

    /// Whether both offsets point into the same compressed block
    #[must_use]
    pub fn same_block(self, other: Self) -> bool {
        self.block_start() == other.block_start()
    }
}
impl From<u64> for VirtualOffset {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.0
    }
}
impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_start(), self.within_block())
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let offset = VirtualOffset::new(123_456, 789);
        assert_eq!(offset.split(), (123_456, 789));
        assert_eq!(offset.as_raw(), (123_456 << 16) | 789);
        assert_eq!(VirtualOffset::from_raw(offset.as_raw()), offset);
    }

    #[test]
    fn test_ordering_block_first() {
        let a = VirtualOffset::new(10, 65_000);
        let b = VirtualOffset::new(11, 0);
        let c = VirtualOffset::new(11, 1);
        assert!(a < b);
        assert!(b < c);
        assert!(b.same_block(c));
        assert!(!a.same_block(b));
    }

    #[test]
    fn test_max_compressed_offset() {
        let offset = VirtualOffset::new(MAX_COMPRESSED_OFFSET, u16::MAX);
        assert_eq!(offset.as_raw(), u64::MAX);
    }

    #[test]
    #[should_panic(expected = "exceeds 48 bits")]
    fn test_compressed_offset_overflow() {
        let _ = VirtualOffset::new(MAX_COMPRESSED_OFFSET + 1, 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(VirtualOffset::new(42, 7).to_string(), "42:7");
    }
}
