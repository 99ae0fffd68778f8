//! ACPI checksum arithmetic.

use core::slice;

use crate::SdtHeader;

/// Compute the checksum of a table based on its self-reported length.
///
/// The caller must ensure that `header` points at a mapping at least
/// `header.length()` bytes long.
pub unsafe fn table_checksum(header: &SdtHeader) -> u8 {
    let data = slice::from_raw_parts(header as *const SdtHeader as *const u8, header.length());
    checksum(data)
}

/// Compute the ACPI checksum over a slice of table bytes.
///
/// All bytes are added with wrap-around; a valid table sums to zero.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0_u8, |acc, b| acc.wrapping_add(*b))
}
