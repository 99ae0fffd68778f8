//! Backend for the local APIC plus IOAPIC pair found on everything newer
//! than the mid nineties.

use kbase::{KernelError, VirtAddr};

use crate::controller::IrqController;
use crate::vectors::{IRQ_BASE, SPURIOUS_VECTOR};

/// Memory mapped registers of the local APIC.
pub struct LocalApic(*mut u32);

impl LocalApic {
    pub const ID_REG: usize = 0x20;
    pub const EOI_REG: usize = 0xB0;
    pub const SPURIOUS_REG: usize = 0xF0;

    /// # Safety
    ///
    /// `base` must be the virtual address the local APIC register page is
    /// mapped at, uncached.
    pub unsafe fn new(base: VirtAddr) -> LocalApic {
        debug_assert!(base.is_aligned(4096));
        LocalApic(base.as_mut_ptr())
    }

    /// Software-enable the APIC and route spurious interrupts to the
    /// conventional top vector.
    pub fn software_enable(&mut self, spurious_vector: u8) {
        let mut value = self.read_reg(Self::SPURIOUS_REG);
        value = (value & !0xFF) | spurious_vector as u32 | 0x100;
        self.write_reg(Self::SPURIOUS_REG, value);
    }

    pub fn signal_eoi(&mut self) {
        self.write_reg(Self::EOI_REG, 0);
    }

    /// Register indices must be 16 byte aligned, as the APIC specification
    /// mandates.
    fn write_reg(&mut self, reg_index: usize, value: u32) {
        debug_assert!(reg_index % 16 == 0);
        unsafe { self.0.add(reg_index >> 2).write_volatile(value) }
    }

    fn read_reg(&self, reg_index: usize) -> u32 {
        debug_assert!(reg_index % 16 == 0);
        unsafe { self.0.add(reg_index >> 2).read_volatile() }
    }
}

/// Memory mapped indirect register pair of an IOAPIC.
pub struct IoApicRegs(*mut u32);

impl IoApicRegs {
    pub const ID_REG: u32 = 0;
    pub const VER_REG: u32 = 1;
    pub const REDIRECTION_BASE: u32 = 0x10;

    /// # Safety
    ///
    /// `base` must be the virtual address the IOAPIC register window is
    /// mapped at, uncached.
    pub unsafe fn new(base: VirtAddr) -> IoApicRegs {
        IoApicRegs(base.as_mut_ptr())
    }

    /// The number of redirection entries this IOAPIC supports.
    pub fn redirection_entry_count(&self) -> u32 {
        ((self.read_reg(Self::VER_REG) >> 16) & 0xFF) + 1
    }

    pub fn redirection_entry(&self, index: u32) -> RedirectionEntry {
        let reg = Self::REDIRECTION_BASE + index * 2;
        let lo = self.read_reg(reg) as u64;
        let hi = self.read_reg(reg + 1) as u64;
        RedirectionEntry((hi << 32) | lo)
    }

    pub fn set_redirection_entry(&mut self, index: u32, entry: RedirectionEntry) {
        let reg = Self::REDIRECTION_BASE + index * 2;
        self.write_reg(reg, (entry.0 & 0xFFFF_FFFF) as u32);
        self.write_reg(reg + 1, (entry.0 >> 32) as u32);
    }

    fn write_reg(&mut self, register_index: u32, value: u32) {
        unsafe {
            self.0.write_volatile(register_index);
            self.0.add(4).write_volatile(value);
        }
    }

    fn read_reg(&self, register_index: u32) -> u32 {
        unsafe {
            self.0.write_volatile(register_index);
            self.0.add(4).read_volatile()
        }
    }
}

/// One entry of the IOAPIC redirection table.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct RedirectionEntry(pub u64);

const ENTRY_MASKED: u64 = 1 << 16;

impl RedirectionEntry {
    /// A masked, edge-triggered, active-high, fixed-delivery entry aimed at
    /// the given vector on APIC 0.
    pub fn masked(vector: u8) -> RedirectionEntry {
        RedirectionEntry(vector as u64 | ENTRY_MASKED)
    }

    pub fn vector(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn is_masked(self) -> bool {
        self.0 & ENTRY_MASKED != 0
    }

    pub fn with_masked(self, masked: bool) -> RedirectionEntry {
        if masked {
            RedirectionEntry(self.0 | ENTRY_MASKED)
        } else {
            RedirectionEntry(self.0 & !ENTRY_MASKED)
        }
    }
}

/// The local APIC + IOAPIC combination acting as one controller.
pub struct ApicChip {
    lapic: LocalApic,
    ioapic: IoApicRegs,
    /// First global system interrupt handled by this IOAPIC.
    gsi_base: u32,
}

// the register windows belong to the one CPU driving them; the lock in
// front of the interrupt system serializes all access
unsafe impl Send for ApicChip {}

assert_impl_all!(ApicChip: Send);

impl ApicChip {
    /// # Safety
    ///
    /// Both register windows must be mapped as described on
    /// [`LocalApic::new`] and [`IoApicRegs::new`].
    pub unsafe fn new(lapic: LocalApic, ioapic: IoApicRegs, gsi_base: u32) -> ApicChip {
        let mut chip = ApicChip {
            lapic,
            ioapic,
            gsi_base,
        };
        chip.lapic.software_enable(SPURIOUS_VECTOR);
        // park every input masked at its default vector
        for index in 0..chip.ioapic.redirection_entry_count() {
            let vector = IRQ_BASE as u32 + chip.gsi_base + index;
            chip.ioapic
                .set_redirection_entry(index, RedirectionEntry::masked(vector as u8));
        }
        chip
    }

    fn entry_index(&self, vector: u8) -> Result<u32, KernelError> {
        if vector < IRQ_BASE || vector == SPURIOUS_VECTOR {
            return Err(KernelError::InvalidArgument);
        }
        let gsi = (vector - IRQ_BASE) as u32;
        if gsi < self.gsi_base || gsi - self.gsi_base >= self.ioapic.redirection_entry_count() {
            return Err(KernelError::InvalidArgument);
        }
        Ok(gsi - self.gsi_base)
    }
}

impl IrqController for ApicChip {
    fn name(&self) -> &'static str {
        "APIC"
    }

    fn is_spurious(&mut self, vector: u8) -> bool {
        // the local APIC delivers spurious interrupts on the designated
        // vector; no in-service bit is set and no EOI must be sent
        vector == SPURIOUS_VECTOR
    }

    fn acknowledge(&mut self, _vector: u8) {
        self.lapic.signal_eoi();
    }

    fn enable(&mut self, vector: u8) -> Result<(), KernelError> {
        let index = self.entry_index(vector)?;
        let entry = RedirectionEntry::masked(vector).with_masked(false);
        self.ioapic.set_redirection_entry(index, entry);
        Ok(())
    }

    fn disable(&mut self, vector: u8) -> Result<(), KernelError> {
        let index = self.entry_index(vector)?;
        let entry = self.ioapic.redirection_entry(index).with_masked(true);
        self.ioapic.set_redirection_entry(index, entry);
        Ok(())
    }
}
