//! Power-of-two alignment arithmetic used throughout the kernel.

/// Return the smallest multiple of `alignment` that is `>= value`.
/// `alignment` must be a power of two.
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Return the largest multiple of `alignment` that is `<= value`.
/// `alignment` must be a power of two.
#[inline]
pub const fn align_down(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    value & !(alignment - 1)
}

/// Check whether `value` is a multiple of `alignment` (a power of two).
#[inline]
pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    value & (alignment - 1) == 0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn align_down_basics() {
        assert_eq!(align_down(23, 8), 16);
        assert_eq!(align_down(24, 8), 24);
        assert_eq!(align_down(25, 8), 24);
        assert_eq!(align_down(0, 4096), 0);
    }

    #[test]
    fn align_up_basics() {
        assert_eq!(align_up(23, 8), 24);
        assert_eq!(align_up(24, 8), 24);
        assert_eq!(align_up(25, 8), 32);
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
    }

    #[test]
    fn aligned_check() {
        assert!(is_aligned(0x2000, 4096));
        assert!(!is_aligned(0x2001, 4096));
    }
}
