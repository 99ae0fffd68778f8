//! The hand-off structure the boot loader passes to `kernel_main` and its
//! translation into the kernel's own memory map.

use kbase::{KernelError, PhysAddr};
use kmm::{MemoryAttributes, MemoryMap, RegionKind};

/// One physical memory region as reported by the boot loader, in bytes.
///
/// The `kind` and `attributes` codes are part of the loader contract; see
/// [`region_kind`] and [`MemoryAttributes`] for their meaning.
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct BootRegion {
    pub start: u64,
    pub size: u64,
    pub kind: u32,
    pub attributes: u32,
}

/// Everything the boot loader tells the kernel about the machine.
#[repr(C)]
pub struct BootInfo {
    /// Pointer to the loader's memory region array.
    pub regions: *const BootRegion,
    pub region_count: u64,
    /// Physical address of the ACPI RSDT, or 0 when absent.
    pub rsdt: u64,
    /// Physical address of the ACPI XSDT, or 0 when absent. Preferred over
    /// the RSDT when both are present.
    pub xsdt: u64,
}

/// Decode a loader region kind code.
fn region_kind(raw: u32) -> Option<RegionKind> {
    match raw {
        0 => Some(RegionKind::Available),
        1 => Some(RegionKind::Bootloader),
        2 => Some(RegionKind::AcpiReclaimable),
        3 => Some(RegionKind::KernelData),
        4 => Some(RegionKind::Kernel),
        5 => Some(RegionKind::Firmware),
        6 => Some(RegionKind::AcpiNvs),
        7 => Some(RegionKind::Persistent),
        8 => Some(RegionKind::Reserved),
        9 => Some(RegionKind::Unusable),
        _ => None,
    }
}

/// Ingest the loader's region array into `map` and sanitize the result.
///
/// Regions with an unknown kind code are kept as `Reserved` rather than
/// silently handed to the allocator. Malformed individual regions are
/// skipped with a warning; only running out of descriptor space fails the
/// whole ingest.
///
/// # Safety
///
/// `info.regions` must point at `info.region_count` readable entries.
pub unsafe fn build_memory_map(info: &BootInfo, map: &mut MemoryMap) -> Result<(), KernelError> {
    if info.regions.is_null() || info.region_count == 0 {
        return Err(KernelError::InvalidArgument);
    }
    let regions = core::slice::from_raw_parts(info.regions, info.region_count as usize);
    for region in regions {
        let kind = match region_kind(region.kind) {
            Some(kind) => kind,
            None => {
                warn!(
                    "unknown region kind {} at {:#x}, treating as reserved",
                    region.kind, region.start
                );
                RegionKind::Reserved
            }
        };
        let attributes = MemoryAttributes::from_bits_truncate(region.attributes);
        match map.add_bytes(kind, attributes, PhysAddr(region.start as usize), region.size as usize) {
            Ok(()) => {}
            Err(KernelError::InvalidArgument) => {
                warn!("skipping malformed boot region at {:#x}", region.start);
            }
            Err(err) => return Err(err),
        }
    }
    map.sanitize();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use kbase::PAGE_SIZE;

    fn info_for(regions: &[BootRegion]) -> BootInfo {
        BootInfo {
            regions: regions.as_ptr(),
            region_count: regions.len() as u64,
            rsdt: 0,
            xsdt: 0,
        }
    }

    #[test]
    fn loader_regions_become_a_sanitized_map() {
        let wb = MemoryAttributes::WRITE_BACK.bits();
        let regions = [
            BootRegion {
                start: 0x100000,
                size: 16 * PAGE_SIZE as u64,
                kind: 0,
                attributes: wb,
            },
            BootRegion {
                start: 0x104000,
                size: 2 * PAGE_SIZE as u64,
                kind: 4, // kernel image inside the available range
                attributes: wb,
            },
        ];
        let mut map = MemoryMap::new();
        unsafe { build_memory_map(&info_for(&regions), &mut map).unwrap() };

        // available split around the kernel image
        assert_eq!(map.available_pages(), 14);
        let kinds: Vec<_> = map.descriptors().iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![RegionKind::Available, RegionKind::Kernel, RegionKind::Available]
        );
    }

    #[test]
    fn unknown_kinds_are_reserved() {
        let regions = [BootRegion {
            start: 0x200000,
            size: PAGE_SIZE as u64,
            kind: 42,
            attributes: 0,
        }];
        let mut map = MemoryMap::new();
        unsafe { build_memory_map(&info_for(&regions), &mut map).unwrap() };

        assert_eq!(map.descriptors()[0].kind, RegionKind::Reserved);
        assert_eq!(map.available_pages(), 0);
    }

    #[test]
    fn empty_hand_off_is_rejected() {
        let mut map = MemoryMap::new();
        let info = BootInfo {
            regions: core::ptr::null(),
            region_count: 0,
            rsdt: 0,
            xsdt: 0,
        };
        assert_eq!(
            unsafe { build_memory_map(&info, &mut map) },
            Err(KernelError::InvalidArgument)
        );
    }
}
