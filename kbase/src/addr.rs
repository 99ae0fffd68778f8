//! Newtype wrappers that make it harder to accidentally confuse physical and
//! virtual addresses.

use core::fmt;
use core::ops;

use crate::align;

/// A physical address. Whether it is accessible depends on the current page
/// mapping.
#[repr(transparent)]
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug, Hash)]
pub struct PhysAddr(pub usize);

/// A virtual address. Its validity depends on the current page mapping.
#[repr(transparent)]
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug, Hash)]
pub struct VirtAddr(pub usize);

impl VirtAddr {
    /// Reinterpret the address as a raw pointer. Dereferencing it is only
    /// valid while the corresponding mapping exists.
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

macro_rules! impl_addr_common {
    ($addr:tt) => {
        impl $addr {
            pub const fn align_up(self, alignment: usize) -> Self {
                $addr(align::align_up(self.0, alignment))
            }

            pub const fn align_down(self, alignment: usize) -> Self {
                $addr(align::align_down(self.0, alignment))
            }

            pub const fn is_aligned(self, alignment: usize) -> bool {
                align::is_aligned(self.0, alignment)
            }
        }

        impl ops::Add<usize> for $addr {
            type Output = $addr;

            fn add(self, other: usize) -> Self::Output {
                $addr(self.0 + other)
            }
        }

        impl ops::AddAssign<usize> for $addr {
            fn add_assign(&mut self, other: usize) {
                self.0 += other;
            }
        }
    };
}

impl_addr_common!(PhysAddr);
impl_addr_common!(VirtAddr);

impl fmt::Pointer for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PHYS_0x{:016x}", self.0)
    }
}

impl fmt::Pointer for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "VIRT_0x{:016x}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn address_alignment() {
        assert_eq!(PhysAddr(0x1234).align_up(0x1000), PhysAddr(0x2000));
        assert_eq!(PhysAddr(0x1234).align_down(0x1000), PhysAddr(0x1000));
        assert!(VirtAddr(0x3000).is_aligned(0x1000));
        assert!(!VirtAddr(0x3008).is_aligned(0x1000));
    }
}
