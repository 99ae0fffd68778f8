//! The system memory map: a sorted, coalesced list of physical memory
//! descriptors, and the frame allocator operating on it.

use kbase::{align, KernelError, PhysAddr, PAGE_SHIFT, PAGE_SIZE};

use core::ops;

/// Number of a physical page frame, counted from the start.
/// The first page frame at physical address 0x0 has number zero.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Copy, Clone)]
pub struct PageFrame(pub usize);

impl PageFrame {
    /// Return the next page frame starting at or above the given physical address.
    pub const fn next_above(addr: PhysAddr) -> PageFrame {
        PageFrame(align::align_up(addr.0, PAGE_SIZE) >> PAGE_SHIFT)
    }

    /// Return the page frame including the given physical address.
    pub const fn including(addr: PhysAddr) -> PageFrame {
        PageFrame(addr.0 >> PAGE_SHIFT)
    }

    pub const fn start_address(self) -> PhysAddr {
        PhysAddr(self.0 * PAGE_SIZE)
    }
}

impl ops::Add<usize> for PageFrame {
    type Output = PageFrame;

    fn add(self, rhs: usize) -> PageFrame {
        PageFrame(self.0 + rhs)
    }
}

/// Classification of a physical memory region.
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub enum RegionKind {
    /// Free memory, usable by the frame allocator.
    Available,
    /// Memory still holding boot loader code or data. Becomes `Available`
    /// after [`MemoryMap::reclaim_boot_regions`].
    Bootloader,
    /// ACPI tables, reclaimable once the kernel is done parsing them.
    AcpiReclaimable,
    /// Data allocated by the kernel at runtime.
    KernelData,
    /// The kernel image itself.
    Kernel,
    /// Firmware-owned memory, e.g. memory-mapped runtime services.
    Firmware,
    /// ACPI non-volatile storage, must survive sleep states.
    AcpiNvs,
    /// Non-volatile byte-addressable memory.
    Persistent,
    /// Reserved by firmware or hardware, never touched.
    Reserved,
    /// Defective or otherwise unusable memory.
    Unusable,
}

impl RegionKind {
    /// Rank deciding which kind wins when two descriptors overlap.
    /// `Available` is the weakest claim, `Unusable` the strongest.
    fn precedence(self) -> u8 {
        match self {
            RegionKind::Available => 0,
            RegionKind::Bootloader => 1,
            RegionKind::AcpiReclaimable => 2,
            RegionKind::KernelData => 3,
            RegionKind::Kernel => 4,
            RegionKind::Firmware => 5,
            RegionKind::AcpiNvs => 6,
            RegionKind::Persistent => 7,
            RegionKind::Reserved => 8,
            RegionKind::Unusable => 9,
        }
    }
}

bitflags! {
    /// Cacheability attributes of a memory region, as reported by firmware.
    pub struct MemoryAttributes: u32 {
        const WRITE_BACK = 1 << 0;
        const WRITE_COMBINING = 1 << 1;
        const WRITE_THROUGH = 1 << 2;
        const UNCACHEABLE = 1 << 3;
    }
}

/// One entry of the memory map, describing a contiguous range of page
/// frames of uniform kind and attributes.
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct MemoryDescriptor {
    pub kind: RegionKind,
    pub attributes: MemoryAttributes,
    pub start: PageFrame,
    pub pages: usize,
}

impl MemoryDescriptor {
    const EMPTY: MemoryDescriptor = MemoryDescriptor {
        kind: RegionKind::Unusable,
        attributes: MemoryAttributes::empty(),
        start: PageFrame(0),
        pages: 0,
    };

    pub const fn start_address(&self) -> PhysAddr {
        self.start.start_address()
    }

    /// The first frame after the region (not included).
    pub fn end(&self) -> PageFrame {
        PageFrame(self.start.0 + self.pages)
    }

    pub const fn byte_size(&self) -> usize {
        self.pages * PAGE_SIZE
    }
}

/// Maximum number of descriptors the map can hold. Firmware maps observed
/// in the wild stay well below this.
pub const MAX_DESCRIPTORS: usize = 128;

/// The system memory map. Descriptors are kept sorted by start address and
/// pairwise non-overlapping between calls to [`MemoryMap::sanitize`].
pub struct MemoryMap {
    entries: [MemoryDescriptor; MAX_DESCRIPTORS],
    len: usize,
    boot_reclaimed: bool,
}

impl MemoryMap {
    pub const fn new() -> MemoryMap {
        MemoryMap {
            entries: [MemoryDescriptor::EMPTY; MAX_DESCRIPTORS],
            len: 0,
            boot_reclaimed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn descriptors(&self) -> &[MemoryDescriptor] {
        &self.entries[..self.len]
    }

    /// Total number of frames currently available to the allocator.
    pub fn available_pages(&self) -> usize {
        self.descriptors()
            .iter()
            .filter(|d| d.kind == RegionKind::Available)
            .map(|d| d.pages)
            .sum()
    }

    /// Record a region given in whole page frames.
    ///
    /// The map is not normalized afterwards; call [`MemoryMap::sanitize`]
    /// once all regions are in.
    pub fn add_frames(
        &mut self,
        kind: RegionKind,
        attributes: MemoryAttributes,
        start: PageFrame,
        pages: usize,
    ) -> Result<(), KernelError> {
        if pages == 0 {
            return Err(KernelError::InvalidArgument);
        }
        if self.len == MAX_DESCRIPTORS {
            return Err(KernelError::OutOfMemory);
        }
        self.entries[self.len] = MemoryDescriptor {
            kind,
            attributes,
            start,
            pages,
        };
        self.len += 1;
        Ok(())
    }

    /// Record a region given in bytes, rounding to page boundaries.
    ///
    /// `Available` regions shrink inward (a partially usable page is not
    /// usable at all), every other kind grows outward (a partially claimed
    /// page is claimed entirely).
    pub fn add_bytes(
        &mut self,
        kind: RegionKind,
        attributes: MemoryAttributes,
        addr: PhysAddr,
        size: usize,
    ) -> Result<(), KernelError> {
        if size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let end_addr = addr.0 + size;
        let (start, end) = if kind == RegionKind::Available {
            (
                PageFrame::next_above(addr),
                PageFrame(align::align_down(end_addr, PAGE_SIZE) >> PAGE_SHIFT),
            )
        } else {
            (
                PageFrame::including(addr),
                PageFrame(align::align_up(end_addr, PAGE_SIZE) >> PAGE_SHIFT),
            )
        };
        if end <= start {
            // an Available region shrunk to nothing
            return Ok(());
        }
        self.add_frames(kind, attributes, start, end.0 - start.0)
    }

    /// Normalize the map: sort by start address, resolve overlaps in favor
    /// of the stronger kind, and merge adjacent descriptors of equal kind
    /// and attributes. Idempotent.
    pub fn sanitize(&mut self) {
        if self.len == 0 {
            return;
        }

        // every region boundary, sorted and deduplicated
        let mut bounds = [0usize; MAX_DESCRIPTORS * 2];
        let mut nbounds = 0;
        for entry in &self.entries[..self.len] {
            bounds[nbounds] = entry.start.0;
            bounds[nbounds + 1] = entry.end().0;
            nbounds += 2;
        }
        for i in 1..nbounds {
            let value = bounds[i];
            let mut j = i;
            while j > 0 && bounds[j - 1] > value {
                bounds[j] = bounds[j - 1];
                j -= 1;
            }
            bounds[j] = value;
        }
        let mut unique = 1;
        for i in 1..nbounds {
            if bounds[i] != bounds[unique - 1] {
                bounds[unique] = bounds[i];
                unique += 1;
            }
        }
        nbounds = unique;

        // paint each segment between two boundaries with the strongest
        // covering descriptor
        let mut out = [MemoryDescriptor::EMPTY; MAX_DESCRIPTORS];
        let mut out_len = 0;
        for window in 0..nbounds - 1 {
            let seg_start = bounds[window];
            let seg_end = bounds[window + 1];

            let mut winner: Option<&MemoryDescriptor> = None;
            for entry in &self.entries[..self.len] {
                if entry.start.0 <= seg_start && entry.end().0 >= seg_end {
                    let better = match winner {
                        None => true,
                        Some(current) => entry.kind.precedence() > current.kind.precedence(),
                    };
                    if better {
                        winner = Some(entry);
                    }
                }
            }
            let winner = match winner {
                Some(winner) => winner,
                None => continue,
            };

            if out_len > 0 {
                let previous = &mut out[out_len - 1];
                if previous.kind == winner.kind
                    && previous.attributes == winner.attributes
                    && previous.end().0 == seg_start
                {
                    previous.pages += seg_end - seg_start;
                    continue;
                }
            }
            if out_len == MAX_DESCRIPTORS {
                error!(
                    "memory map overflow, dropping {:?} segment at frame {}",
                    winner.kind, seg_start
                );
                continue;
            }
            out[out_len] = MemoryDescriptor {
                kind: winner.kind,
                attributes: winner.attributes,
                start: PageFrame(seg_start),
                pages: seg_end - seg_start,
            };
            out_len += 1;
        }

        self.entries[..out_len].copy_from_slice(&out[..out_len]);
        self.len = out_len;
    }

    /// Allocate `pages` contiguous frames, recording them under `kind`.
    ///
    /// Frames are carved from the top of the highest-ending `Available`
    /// write-back region that is large enough, preserving scarce low
    /// memory for components that need it.
    pub fn allocate_frames(
        &mut self,
        kind: RegionKind,
        pages: usize,
    ) -> Result<PhysAddr, KernelError> {
        if pages == 0 || kind == RegionKind::Available {
            return Err(KernelError::InvalidArgument);
        }

        let mut best: Option<usize> = None;
        for (i, entry) in self.entries[..self.len].iter().enumerate() {
            if entry.kind == RegionKind::Available
                && entry.attributes.contains(MemoryAttributes::WRITE_BACK)
                && entry.pages >= pages
            {
                let better = match best {
                    None => true,
                    Some(b) => entry.end() > self.entries[b].end(),
                };
                if better {
                    best = Some(i);
                }
            }
        }
        let source = best.ok_or(KernelError::OutOfMemory)?;

        let attributes = self.entries[source].attributes;
        let source_start = self.entries[source].start;
        let start = PageFrame(self.entries[source].end().0 - pages);

        self.entries[source].pages -= pages;
        let carved = MemoryDescriptor {
            kind,
            attributes,
            start,
            pages,
        };
        if let Err(err) = self.insert_region(carved) {
            // insertion may shift indices, locate the source again
            if let Some(pos) = self.entries[..self.len]
                .iter()
                .position(|e| e.start == source_start)
            {
                self.entries[pos].pages += pages;
            }
            return Err(err);
        }
        if let Some(pos) = self.entries[..self.len]
            .iter()
            .position(|e| e.start == source_start && e.pages == 0)
        {
            self.remove(pos);
        }
        Ok(start.start_address())
    }

    /// Allocate enough frames for `size` bytes, rounded up to whole pages.
    pub fn allocate_bytes(&mut self, kind: RegionKind, size: usize) -> Result<PhysAddr, KernelError> {
        if size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        self.allocate_frames(kind, align::align_up(size, PAGE_SIZE) >> PAGE_SHIFT)
    }

    /// Return frames to the available pool.
    ///
    /// Reclamation is not implemented yet; arguments are validated and the
    /// request is dropped. Tracked as a follow-up once a free-list design
    /// is settled.
    pub fn free_frames(&mut self, addr: PhysAddr, pages: usize) -> Result<(), KernelError> {
        if pages == 0 || !addr.is_aligned(PAGE_SIZE) {
            return Err(KernelError::InvalidArgument);
        }
        debug!("free_frames({:p}, {} pages) deferred", addr, pages);
        Ok(())
    }

    /// One-time boot-to-runtime transition: boot loader memory becomes
    /// available for allocation. A second call fails with `Conflict`.
    pub fn reclaim_boot_regions(&mut self) -> Result<(), KernelError> {
        if self.boot_reclaimed {
            return Err(KernelError::Conflict);
        }
        for entry in self.entries[..self.len].iter_mut() {
            if entry.kind == RegionKind::Bootloader {
                entry.kind = RegionKind::Available;
            }
        }
        self.sanitize();
        self.boot_reclaimed = true;
        Ok(())
    }

    /// Insert a carved-out region, preferring to extend an address-adjacent
    /// descriptor of the same kind and attributes.
    fn insert_region(&mut self, region: MemoryDescriptor) -> Result<(), KernelError> {
        for entry in self.entries[..self.len].iter_mut() {
            if entry.kind == region.kind && entry.attributes == region.attributes {
                if entry.end() == region.start {
                    entry.pages += region.pages;
                    return Ok(());
                }
                if region.end() == entry.start {
                    entry.start = region.start;
                    entry.pages += region.pages;
                    return Ok(());
                }
            }
        }
        if self.len == MAX_DESCRIPTORS {
            return Err(KernelError::OutOfMemory);
        }
        let pos = self.entries[..self.len]
            .iter()
            .position(|e| e.start > region.start)
            .unwrap_or(self.len);
        for i in (pos..self.len).rev() {
            self.entries[i + 1] = self.entries[i];
        }
        self.entries[pos] = region;
        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, pos: usize) {
        for i in pos..self.len - 1 {
            self.entries[i] = self.entries[i + 1];
        }
        self.len -= 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const WB: MemoryAttributes = MemoryAttributes::WRITE_BACK;

    fn assert_normalized(map: &MemoryMap) {
        let entries = map.descriptors();
        for pair in entries.windows(2) {
            assert!(
                pair[0].end() <= pair[1].start,
                "overlap or disorder: {:?} vs {:?}",
                pair[0],
                pair[1]
            );
            let adjacent = pair[0].end() == pair[1].start;
            let mergeable =
                pair[0].kind == pair[1].kind && pair[0].attributes == pair[1].attributes;
            assert!(!(adjacent && mergeable), "unmerged neighbors: {:?}", pair);
        }
    }

    #[test]
    fn sanitize_is_idempotent() {
        let mut map = MemoryMap::new();
        map.add_frames(RegionKind::Available, WB, PageFrame(0), 256).unwrap();
        map.add_frames(RegionKind::Kernel, WB, PageFrame(16), 32).unwrap();
        map.add_frames(RegionKind::Reserved, MemoryAttributes::UNCACHEABLE, PageFrame(40), 8)
            .unwrap();
        map.add_frames(RegionKind::Available, WB, PageFrame(256), 256).unwrap();
        map.sanitize();

        assert_normalized(&map);
        let first = map.descriptors().to_vec();
        map.sanitize();
        assert_eq!(first, map.descriptors());
    }

    #[test]
    fn overlap_resolution_prefers_stronger_kind() {
        let mut map = MemoryMap::new();
        map.add_frames(RegionKind::Available, WB, PageFrame(0), 100).unwrap();
        map.add_frames(RegionKind::Reserved, WB, PageFrame(10), 10).unwrap();
        map.sanitize();

        let entries = map.descriptors();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind, RegionKind::Available);
        assert_eq!(entries[0].pages, 10);
        assert_eq!(entries[1].kind, RegionKind::Reserved);
        assert_eq!(entries[1].start, PageFrame(10));
        assert_eq!(entries[1].pages, 10);
        assert_eq!(entries[2].kind, RegionKind::Available);
        assert_eq!(entries[2].start, PageFrame(20));
        assert_eq!(entries[2].pages, 80);
    }

    #[test]
    fn rounding_shrinks_available_and_grows_reserved() {
        for &offset in &[0usize, 1, 0x800, 0xFFF] {
            for &size in &[PAGE_SIZE * 3, PAGE_SIZE * 3 + 1, PAGE_SIZE * 3 + 0xFFF] {
                let addr = PhysAddr(0x10000 + offset);
                let end = addr.0 + size;

                let mut map = MemoryMap::new();
                map.add_bytes(RegionKind::Available, WB, addr, size).unwrap();
                if let Some(desc) = map.descriptors().first() {
                    assert!(desc.start_address().0 >= addr.0);
                    assert!(desc.end().start_address().0 <= end);
                    assert!(desc.start_address().is_aligned(PAGE_SIZE));
                }

                let mut map = MemoryMap::new();
                map.add_bytes(RegionKind::Reserved, WB, addr, size).unwrap();
                let desc = map.descriptors()[0];
                assert!(desc.start_address().0 <= addr.0);
                assert!(desc.end().start_address().0 >= end);
                assert!(desc.start_address().is_aligned(PAGE_SIZE));
            }
        }
    }

    #[test]
    fn zero_sized_regions_are_rejected() {
        let mut map = MemoryMap::new();
        assert_eq!(
            map.add_bytes(RegionKind::Available, WB, PhysAddr(0x1000), 0),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            map.add_frames(RegionKind::Reserved, WB, PageFrame(1), 0),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn allocation_is_top_down() {
        let mut map = MemoryMap::new();
        map.add_frames(RegionKind::Available, WB, PageFrame(0x100), 64).unwrap();
        map.add_frames(RegionKind::Available, WB, PageFrame(0x1000), 64).unwrap();
        map.sanitize();

        let addr = map.allocate_frames(RegionKind::KernelData, 16).unwrap();
        assert_eq!(addr, PageFrame(0x1000 + 64 - 16).start_address());
    }

    #[test]
    fn allocation_records_requested_kind() {
        let mut map = MemoryMap::new();
        map.add_frames(RegionKind::Available, WB, PageFrame(0x100), 64).unwrap();
        map.sanitize();

        let addr = map.allocate_frames(RegionKind::KernelData, 8).unwrap();
        let start = PageFrame::including(addr);

        let covering = map
            .descriptors()
            .iter()
            .find(|d| d.start <= start && d.end().0 >= start.0 + 8)
            .expect("allocated range must be covered by a descriptor");
        assert_eq!(covering.kind, RegionKind::KernelData);

        // the carved range no longer counts as available
        for desc in map.descriptors() {
            if desc.kind == RegionKind::Available {
                assert!(desc.end() <= start || desc.start.0 >= start.0 + 8);
            }
        }
    }

    #[test]
    fn allocation_scenario_sixteen_page_region() {
        let mut map = MemoryMap::new();
        map.add_bytes(RegionKind::Available, WB, PhysAddr(0x100000), 16 * PAGE_SIZE)
            .unwrap();
        map.add_bytes(RegionKind::Reserved, WB, PhysAddr(0x200000), 10 * PAGE_SIZE)
            .unwrap();
        map.sanitize();

        let addr = map.allocate_frames(RegionKind::Bootloader, 10).unwrap();
        assert_eq!(addr, PhysAddr(0x100000 + 6 * PAGE_SIZE));

        let available: std::vec::Vec<_> = map
            .descriptors()
            .iter()
            .filter(|d| d.kind == RegionKind::Available)
            .collect();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].start_address(), PhysAddr(0x100000));
        assert_eq!(available[0].pages, 6);
    }

    #[test]
    fn allocation_argument_validation() {
        let mut map = MemoryMap::new();
        map.add_frames(RegionKind::Available, WB, PageFrame(0x100), 4).unwrap();

        assert_eq!(
            map.allocate_frames(RegionKind::KernelData, 0),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            map.allocate_frames(RegionKind::Available, 1),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            map.allocate_frames(RegionKind::KernelData, 5),
            Err(KernelError::OutOfMemory)
        );
    }

    #[test]
    fn allocation_requires_write_back() {
        let mut map = MemoryMap::new();
        map.add_frames(
            RegionKind::Available,
            MemoryAttributes::UNCACHEABLE,
            PageFrame(0x100),
            16,
        )
        .unwrap();
        assert_eq!(
            map.allocate_frames(RegionKind::KernelData, 1),
            Err(KernelError::OutOfMemory)
        );
    }

    #[test]
    fn free_frames_validates_arguments() {
        let mut map = MemoryMap::new();
        assert_eq!(
            map.free_frames(PhysAddr(0x1001), 1),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            map.free_frames(PhysAddr(0x1000), 0),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(map.free_frames(PhysAddr(0x1000), 1), Ok(()));
    }

    #[test]
    fn boot_reclaim_is_exactly_once() {
        let mut map = MemoryMap::new();
        map.add_frames(RegionKind::Bootloader, WB, PageFrame(0x100), 16).unwrap();
        map.add_frames(RegionKind::Available, WB, PageFrame(0x110), 16).unwrap();
        map.sanitize();

        assert_eq!(map.reclaim_boot_regions(), Ok(()));
        assert_eq!(map.descriptors().len(), 1);
        assert_eq!(map.descriptors()[0].kind, RegionKind::Available);
        assert_eq!(map.descriptors()[0].pages, 32);

        assert_eq!(map.reclaim_boot_regions(), Err(KernelError::Conflict));
    }
}
