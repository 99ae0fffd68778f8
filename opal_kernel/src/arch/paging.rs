//! Page table manipulation through the direct physical mapping.
//!
//! The boot loader maps all of physical memory at [`layout::PHYS_OFFSET`],
//! which is how the walker below reaches the tables themselves. Frames for
//! missing intermediate tables come out of the memory map, one reason the
//! [`MemoryMapper`] interface threads it through every mapping call.
//!
//! Loader contract: the direct mapping uses 4 KiB pages throughout, so a
//! leaf entry covering a device window can be retyped in place. A huge
//! page met during a walk is therefore somebody else's mapping and a
//! genuine conflict.

use crate::layout;

use kbase::{cpu, KernelError, PhysAddr, VirtAddr, PAGE_SIZE};
use kmm::map::{MemoryMap, RegionKind};
use kmm::paging::{index_at_level, PageFlags, PageTableEntry};
use kmm::MemoryMapper;

use core::arch::asm;

/// Intermediate entries stay permissive, the leaf entry decides access.
fn table_flags() -> PageFlags {
    PageFlags::PRESENT | PageFlags::WRITABLE
}

unsafe fn invalidate(vaddr: VirtAddr) {
    asm!("invlpg [{}]", in(reg) vaddr.0, options(nostack, preserves_flags));
}

/// Decide what to write over the current leaf entry when mapping `phys`
/// with `flags`. With `retype`, an entry already aliasing the same frame
/// is rewritten so the requested attributes win over whatever the direct
/// map installed; everything else that is present is a conflict.
fn reconcile(
    current: PageTableEntry,
    phys: PhysAddr,
    flags: PageFlags,
    retype: bool,
) -> Result<PageTableEntry, KernelError> {
    if current.is_present() && !(retype && current.base() == phys) {
        return Err(KernelError::Conflict);
    }
    Ok(PageTableEntry::new(phys, flags | PageFlags::PRESENT))
}

/// The kernel's page table hierarchy, adopted from whatever the boot
/// loader activated.
pub struct OffsetMapper {
    root: PhysAddr,
}

impl OffsetMapper {
    /// Adopt the hierarchy the CPU is currently using.
    ///
    /// # Safety
    ///
    /// The direct mapping at [`layout::PHYS_OFFSET`] must cover every
    /// frame holding page tables.
    pub unsafe fn current() -> OffsetMapper {
        OffsetMapper {
            root: PhysAddr(cpu::read_cr3()),
        }
    }

    fn table(&self, base: PhysAddr) -> *mut PageTableEntry {
        layout::phys_to_virt(base).as_mut_ptr()
    }

    /// Walk down to the level-0 entry for `vaddr`, allocating missing
    /// intermediate tables along the way.
    fn walk_mut(
        &mut self,
        frames: &mut MemoryMap,
        vaddr: VirtAddr,
    ) -> Result<*mut PageTableEntry, KernelError> {
        let mut base = self.root;
        for level in (1..=3).rev() {
            let slot = unsafe { self.table(base).add(index_at_level(level, vaddr)) };
            let entry = unsafe { slot.read() };
            if entry.is_present() {
                if entry.flags().contains(PageFlags::SIZE) {
                    // a huge page already covers this range
                    return Err(KernelError::Conflict);
                }
                base = entry.base();
            } else {
                let fresh = frames.allocate_frames(RegionKind::KernelData, 1)?;
                unsafe {
                    core::ptr::write_bytes(
                        layout::phys_to_virt(fresh).as_mut_ptr::<u8>(),
                        0,
                        PAGE_SIZE,
                    );
                    slot.write(PageTableEntry::new(fresh, table_flags()));
                }
                base = fresh;
            }
        }
        Ok(unsafe { self.table(base).add(index_at_level(0, vaddr)) })
    }

    fn map_one(
        &mut self,
        frames: &mut MemoryMap,
        vaddr: VirtAddr,
        phys: PhysAddr,
        flags: PageFlags,
        retype: bool,
    ) -> Result<(), KernelError> {
        let slot = self.walk_mut(frames, vaddr)?;
        let entry = reconcile(unsafe { slot.read() }, phys, flags, retype)?;
        unsafe {
            slot.write(entry);
            invalidate(vaddr);
        }
        Ok(())
    }
}

impl MemoryMapper for OffsetMapper {
    fn map_system_memory(
        &mut self,
        frames: &mut MemoryMap,
        phys: PhysAddr,
        pages: usize,
        flags: PageFlags,
    ) -> Result<VirtAddr, KernelError> {
        if pages == 0 || !phys.is_aligned(PAGE_SIZE) {
            return Err(KernelError::InvalidArgument);
        }
        let vaddr = layout::phys_to_virt(phys);
        for page in 0..pages {
            let offset = page * PAGE_SIZE;
            // a frame the boot loader already direct-mapped is retyped to
            // the requested attributes; device windows must not keep the
            // direct map's cacheable entry
            self.map_one(frames, vaddr + offset, phys + offset, flags, true)?;
        }
        Ok(vaddr)
    }

    fn map_fixed(
        &mut self,
        frames: &mut MemoryMap,
        vaddr: VirtAddr,
        phys: PhysAddr,
        pages: usize,
        flags: PageFlags,
    ) -> Result<(), KernelError> {
        if pages == 0 || !vaddr.is_aligned(PAGE_SIZE) || !phys.is_aligned(PAGE_SIZE) {
            return Err(KernelError::InvalidArgument);
        }
        for page in 0..pages {
            let offset = page * PAGE_SIZE;
            self.map_one(frames, vaddr + offset, phys + offset, flags, false)?;
        }
        Ok(())
    }

    fn find_system_memory(&self, phys: PhysAddr) -> Option<VirtAddr> {
        Some(layout::phys_to_virt(phys))
    }
}
