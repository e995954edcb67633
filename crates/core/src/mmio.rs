//! Word-granular MMIO helpers.
//!
//! Memory-mapped devices are accessed one aligned 32-bit word at a time with
//! a byte mask. Sub-word CPU accesses become masked word accesses: the value
//! is shifted into its lane and the mask selects the lane. Lane numbering is
//! big-endian: byte address `n & 3 == 0` is the most significant byte.

/// `*dst = (*dst & !mask) | (value & mask)`
#[inline]
pub fn masked_write(dst: &mut u32, value: u32, mask: u32) {
    *dst = (*dst & !mask) | (value & mask);
}

/// Bit shift of the byte lane addressed by `address`.
#[inline]
pub fn byte_shift(address: u32) -> u32 {
    ((address & 3) ^ 3) << 3
}

/// Bit shift of the halfword lane addressed by `address`.
#[inline]
pub fn half_shift(address: u32) -> u32 {
    ((address & 2) ^ 2) << 3
}

/// Value and mask for a byte store.
#[inline]
pub fn byte_lane(address: u32, value: u8) -> (u32, u32) {
    let shift = byte_shift(address);
    ((value as u32) << shift, 0xff << shift)
}

/// Value and mask for a halfword store.
#[inline]
pub fn half_lane(address: u32, value: u16) -> (u32, u32) {
    let shift = half_shift(address);
    ((value as u32) << shift, 0xffff << shift)
}

/// Extract the byte addressed by `address` from an aligned word.
#[inline]
pub fn extract_byte(word: u32, address: u32) -> u8 {
    (word >> byte_shift(address)) as u8
}

/// Extract the halfword addressed by `address` from an aligned word.
#[inline]
pub fn extract_half(word: u32, address: u32) -> u16 {
    (word >> half_shift(address)) as u16
}

/// Byte offset within the word and access size implied by a write mask.
///
/// Unrecognized masks are treated as full-word writes.
pub fn mask_extent(mask: u32) -> (u32, usize) {
    match mask {
        0xff00_0000 => (0, 1),
        0x00ff_0000 => (1, 1),
        0x0000_ff00 => (2, 1),
        0x0000_00ff => (3, 1),
        0xffff_0000 => (0, 2),
        0x0000_ffff => (2, 2),
        _ => (0, 4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_write_only_touches_mask() {
        let mut word = 0x1122_3344;
        masked_write(&mut word, 0xaabb_ccdd, 0x00ff_0000);
        assert_eq!(word, 0x11bb_3344);
    }

    #[test]
    fn test_masked_write_is_idempotent() {
        let mut once = 0xdead_beef;
        masked_write(&mut once, 0x0123_4567, 0xf0f0_0ff0);
        let mut twice = once;
        masked_write(&mut twice, 0x0123_4567, 0xf0f0_0ff0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_byte_lanes_are_big_endian() {
        assert_eq!(byte_lane(0x1000, 0xab), (0xab00_0000, 0xff00_0000));
        assert_eq!(byte_lane(0x1001, 0xab), (0x00ab_0000, 0x00ff_0000));
        assert_eq!(byte_lane(0x1003, 0xab), (0x0000_00ab, 0x0000_00ff));
        assert_eq!(half_lane(0x1002, 0xbeef), (0x0000_beef, 0x0000_ffff));
        assert_eq!(half_lane(0x1000, 0xbeef), (0xbeef_0000, 0xffff_0000));
    }

    #[test]
    fn test_extract_matches_lane() {
        let word = 0x1122_3344;
        assert_eq!(extract_byte(word, 0), 0x11);
        assert_eq!(extract_byte(word, 2), 0x33);
        assert_eq!(extract_half(word, 0), 0x1122);
        assert_eq!(extract_half(word, 2), 0x3344);
    }

    #[test]
    fn test_mask_extent() {
        assert_eq!(mask_extent(0x00ff_0000), (1, 1));
        assert_eq!(mask_extent(0x0000_ffff), (2, 2));
        assert_eq!(mask_extent(0xffff_ffff), (0, 4));
    }
}
