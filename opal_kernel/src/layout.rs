//! The kernel's virtual address space layout.

use kbase::{PhysAddr, VirtAddr};

/// Base of the direct mapping of all physical memory, established by the
/// boot loader in the lower half of kernel space.
pub const PHYS_OFFSET: usize = 0xFFFF_8000_0000_0000;

/// Virtual address a physical address is reachable at through the direct
/// mapping.
pub const fn phys_to_virt(phys: PhysAddr) -> VirtAddr {
    VirtAddr(PHYS_OFFSET + phys.0)
}

/// Invert the direct mapping. Returns `None` for addresses outside it.
pub fn virt_to_phys(vaddr: VirtAddr) -> Option<PhysAddr> {
    vaddr.0.checked_sub(PHYS_OFFSET).map(PhysAddr)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn direct_mapping_round_trip() {
        let phys = PhysAddr(0x1234_5000);
        let virt = phys_to_virt(phys);
        assert_eq!(virt, VirtAddr(PHYS_OFFSET + 0x1234_5000));
        assert_eq!(virt_to_phys(virt), Some(phys));
        assert_eq!(virt_to_phys(VirtAddr(0x1000)), None);
    }
}
