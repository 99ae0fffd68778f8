//! x86_64 page table entry layout and the translation from memory map
//! attributes to page table flags.

use kbase::{PhysAddr, VirtAddr};

use crate::map::{MemoryAttributes, MemoryDescriptor};

/// Number of entries in a page table at every level.
pub const TABLE_ENTRIES: usize = 512;

/// Width of the index into one page table level.
const INDEX_BIT_WIDTH: u32 = 9;
const INDEX_MASK: usize = 0x1FF;

bitflags! {
    pub struct PageFlags: u64 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER_ACCESSIBLE = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        /// On the PD and PDP levels, marks a huge page mapping.
        const SIZE = 1 << 7;
        const GLOBAL = 1 << 8;
        const NO_EXECUTE = 1 << 63;
    }
}

/// Mask extracting the frame base address from a page table entry.
const BASE_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// One entry of a page table, at any level of the hierarchy.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

assert_eq_size!(PageTableEntry, u64);

impl PageTableEntry {
    pub const fn zero() -> PageTableEntry {
        PageTableEntry(0)
    }

    pub const fn new(base: PhysAddr, flags: PageFlags) -> PageTableEntry {
        PageTableEntry((base.0 as u64 & BASE_MASK) | flags.bits())
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(PageFlags::PRESENT)
    }

    pub fn base(self) -> PhysAddr {
        PhysAddr((self.0 & BASE_MASK) as usize)
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }
}

/// Return the index into the page table at the given level (0 is PT, 3 is
/// PML4) that is responsible for the given virtual address.
pub fn index_at_level(level: u32, vaddr: VirtAddr) -> usize {
    (vaddr.0 >> (kbase::PAGE_SHIFT + INDEX_BIT_WIDTH * level)) & INDEX_MASK
}

/// Translate a descriptor's cacheability attributes into page table flags.
///
/// An unrecognizable attribute combination falls back to plain write-back,
/// with a warning, since that is the safest default for ordinary RAM.
pub fn page_flags(descriptor: &MemoryDescriptor) -> PageFlags {
    let attrs = descriptor.attributes;
    if attrs.contains(MemoryAttributes::WRITE_BACK) {
        PageFlags::empty()
    } else if attrs.contains(MemoryAttributes::WRITE_THROUGH) {
        PageFlags::WRITE_THROUGH
    } else if attrs.contains(MemoryAttributes::WRITE_COMBINING) {
        // without PAT setup the closest encoding is uncached
        PageFlags::CACHE_DISABLE
    } else if attrs.contains(MemoryAttributes::UNCACHEABLE) {
        PageFlags::CACHE_DISABLE | PageFlags::WRITE_THROUGH
    } else {
        warn!(
            "no usable cache attribute in {:?} at {:p}, assuming write-back",
            attrs,
            descriptor.start_address()
        );
        PageFlags::empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::{PageFrame, RegionKind};

    fn descriptor(attributes: MemoryAttributes) -> MemoryDescriptor {
        MemoryDescriptor {
            kind: RegionKind::Available,
            attributes,
            start: PageFrame(0x100),
            pages: 1,
        }
    }

    #[test]
    fn entry_round_trip() {
        let entry = PageTableEntry::new(
            PhysAddr(0x1234_5000),
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::NO_EXECUTE,
        );
        assert!(entry.is_present());
        assert_eq!(entry.base(), PhysAddr(0x1234_5000));
        assert!(entry.flags().contains(PageFlags::WRITABLE | PageFlags::NO_EXECUTE));
    }

    #[test]
    fn attribute_translation() {
        assert_eq!(
            page_flags(&descriptor(MemoryAttributes::WRITE_BACK)),
            PageFlags::empty()
        );
        assert_eq!(
            page_flags(&descriptor(MemoryAttributes::WRITE_THROUGH)),
            PageFlags::WRITE_THROUGH
        );
        assert_eq!(
            page_flags(&descriptor(MemoryAttributes::UNCACHEABLE)),
            PageFlags::CACHE_DISABLE | PageFlags::WRITE_THROUGH
        );
        // fallback is write-back
        assert_eq!(
            page_flags(&descriptor(MemoryAttributes::empty())),
            PageFlags::empty()
        );
    }

    #[test]
    fn table_indices() {
        let vaddr = VirtAddr(0xFFFF_8000_0012_3456);
        assert_eq!(index_at_level(0, vaddr), (0x123456 >> 12) & 0x1FF);
        assert_eq!(index_at_level(3, vaddr), 256);
    }
}
