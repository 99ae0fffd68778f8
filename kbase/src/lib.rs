#![cfg_attr(not(test), no_std)]

pub mod addr;
pub mod align;
pub mod error;

#[cfg(target_arch = "x86_64")]
pub mod cpu;

pub use self::addr::{PhysAddr, VirtAddr};
pub use self::error::KernelError;

/// Number of trailing zeros in a page aligned address.
pub const PAGE_SHIFT: u32 = 12;

/// Size of a normal physical page, 4096 bytes.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
