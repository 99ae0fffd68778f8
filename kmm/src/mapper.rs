//! The architecture collaborator that turns allocated frames into usable
//! virtual memory, and the composed allocation helpers built on top of it.

use kbase::{align, KernelError, PhysAddr, VirtAddr, PAGE_SHIFT, PAGE_SIZE};

use crate::map::{MemoryMap, RegionKind};
use crate::paging::PageFlags;

/// Narrow interface to the architecture's page table code.
///
/// Implementations may need frames for intermediate page tables, which is
/// why every mapping call also receives the memory map.
pub trait MemoryMapper {
    /// Map `pages` frames starting at `phys` somewhere into the kernel's
    /// address range and return the chosen virtual address.
    fn map_system_memory(
        &mut self,
        frames: &mut MemoryMap,
        phys: PhysAddr,
        pages: usize,
        flags: PageFlags,
    ) -> Result<VirtAddr, KernelError>;

    /// Map `pages` frames starting at `phys` at the caller-chosen virtual
    /// address `vaddr`.
    fn map_fixed(
        &mut self,
        frames: &mut MemoryMap,
        vaddr: VirtAddr,
        phys: PhysAddr,
        pages: usize,
        flags: PageFlags,
    ) -> Result<(), KernelError>;

    /// Return the virtual address `phys` was previously mapped at, if any.
    fn find_system_memory(&self, phys: PhysAddr) -> Option<VirtAddr>;
}

/// Page flags for ordinary kernel data: writable, never executable.
pub fn kernel_data_flags() -> PageFlags {
    PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::NO_EXECUTE
}

/// Allocate `pages` frames and map them into the kernel's address range.
///
/// If the mapping step fails the frames are handed back before the error
/// propagates.
pub fn alloc_pages<M: MemoryMapper>(
    map: &mut MemoryMap,
    mapper: &mut M,
    pages: usize,
) -> Result<VirtAddr, KernelError> {
    let phys = map.allocate_frames(RegionKind::KernelData, pages)?;
    match mapper.map_system_memory(map, phys, pages, kernel_data_flags()) {
        Ok(vaddr) => Ok(vaddr),
        Err(err) => {
            map.free_frames(phys, pages)?;
            Err(err)
        }
    }
}

/// Commit the caller-chosen virtual range `[vaddr, vaddr + size)` with
/// freshly allocated, zero-filled frames.
pub fn virtual_alloc<M: MemoryMapper>(
    map: &mut MemoryMap,
    mapper: &mut M,
    vaddr: VirtAddr,
    size: usize,
) -> Result<(), KernelError> {
    if size == 0 || !vaddr.is_aligned(PAGE_SIZE) {
        return Err(KernelError::InvalidArgument);
    }
    let pages = align::align_up(size, PAGE_SIZE) >> PAGE_SHIFT;
    let phys = map.allocate_frames(RegionKind::KernelData, pages)?;
    if let Err(err) = mapper.map_fixed(map, vaddr, phys, pages, kernel_data_flags()) {
        map.free_frames(phys, pages)?;
        return Err(err);
    }
    unsafe {
        core::ptr::write_bytes(vaddr.as_mut_ptr::<u8>(), 0, pages * PAGE_SIZE);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::{MemoryAttributes, PageFrame};

    /// A mapper that pretends everything is identity mapped, recording each
    /// call, and optionally failing.
    struct FakeMapper {
        mapped: std::vec::Vec<(VirtAddr, PhysAddr, usize)>,
        fail: bool,
    }

    impl FakeMapper {
        fn new() -> FakeMapper {
            FakeMapper {
                mapped: std::vec::Vec::new(),
                fail: false,
            }
        }
    }

    impl MemoryMapper for FakeMapper {
        fn map_system_memory(
            &mut self,
            _frames: &mut MemoryMap,
            phys: PhysAddr,
            pages: usize,
            _flags: PageFlags,
        ) -> Result<VirtAddr, KernelError> {
            if self.fail {
                return Err(KernelError::OutOfMemory);
            }
            let vaddr = VirtAddr(phys.0);
            self.mapped.push((vaddr, phys, pages));
            Ok(vaddr)
        }

        fn map_fixed(
            &mut self,
            _frames: &mut MemoryMap,
            vaddr: VirtAddr,
            phys: PhysAddr,
            pages: usize,
            _flags: PageFlags,
        ) -> Result<(), KernelError> {
            if self.fail {
                return Err(KernelError::OutOfMemory);
            }
            self.mapped.push((vaddr, phys, pages));
            Ok(())
        }

        fn find_system_memory(&self, phys: PhysAddr) -> Option<VirtAddr> {
            self.mapped
                .iter()
                .find(|(_, p, pages)| p.0 <= phys.0 && phys.0 < p.0 + pages * PAGE_SIZE)
                .map(|(v, p, _)| VirtAddr(v.0 + (phys.0 - p.0)))
        }
    }

    fn small_map() -> MemoryMap {
        let mut map = MemoryMap::new();
        map.add_frames(
            RegionKind::Available,
            MemoryAttributes::WRITE_BACK,
            PageFrame(0x100),
            16,
        )
        .unwrap();
        map.sanitize();
        map
    }

    #[test]
    fn alloc_pages_maps_allocated_frames() {
        let mut map = small_map();
        let mut mapper = FakeMapper::new();

        let vaddr = alloc_pages(&mut map, &mut mapper, 4).unwrap();
        assert_eq!(mapper.mapped.len(), 1);
        let (mapped_vaddr, phys, pages) = mapper.mapped[0];
        assert_eq!(mapped_vaddr, vaddr);
        assert_eq!(pages, 4);
        assert_eq!(phys, PageFrame(0x100 + 16 - 4).start_address());
    }

    #[test]
    fn alloc_pages_propagates_mapping_failure() {
        let mut map = small_map();
        let mut mapper = FakeMapper::new();
        mapper.fail = true;

        assert_eq!(
            alloc_pages(&mut map, &mut mapper, 4),
            Err(KernelError::OutOfMemory)
        );
    }

    #[test]
    fn virtual_alloc_zero_fills() {
        #[repr(align(4096))]
        struct PageBuf([u8; 2 * PAGE_SIZE]);

        let mut buf = std::boxed::Box::new(PageBuf([0xAA; 2 * PAGE_SIZE]));
        let vaddr = VirtAddr(buf.0.as_mut_ptr() as usize);

        let mut map = small_map();
        let mut mapper = FakeMapper::new();

        virtual_alloc(&mut map, &mut mapper, vaddr, 2 * PAGE_SIZE).unwrap();
        assert!(buf.0.iter().all(|&b| b == 0));
        assert_eq!(mapper.mapped[0].0, vaddr);
    }

    #[test]
    fn virtual_alloc_validates_arguments() {
        let mut map = small_map();
        let mut mapper = FakeMapper::new();

        assert_eq!(
            virtual_alloc(&mut map, &mut mapper, VirtAddr(0x1001), PAGE_SIZE),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            virtual_alloc(&mut map, &mut mapper, VirtAddr(0x1000), 0),
            Err(KernelError::InvalidArgument)
        );
    }
}
