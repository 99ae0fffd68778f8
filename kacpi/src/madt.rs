//! The Multiple APIC Description Table: interrupt controller inventory and
//! the legacy IRQ override list.

use kbase::PhysAddr;

use crate::{AcpiTable, SdtHeader};

/// The Multiple APIC Description Table.
#[repr(C, packed)]
pub struct Madt {
    header: SdtHeader,
    local_apic_address: u32,
    flags: u32,
    records: [u8; 0],
}

unsafe impl AcpiTable for Madt {
    const SIGNATURE: [u8; 4] = *b"APIC";

    fn header(&self) -> &SdtHeader {
        &self.header
    }
}

/// Set when the machine also has a legacy dual 8259 PIC that must be masked
/// before the APICs are used.
pub const MADT_PCAT_COMPAT: u32 = 1;

impl Madt {
    /// The physical address at which the local APIC is mapped.
    ///
    /// A 64 bit address override entry wins over the 32 bit header field.
    pub fn local_apic_address(&self) -> PhysAddr {
        let default_addr = PhysAddr(self.local_apic_address as usize);
        self.entries()
            .find_map(|e| e.local_apic_address_override())
            .map_or(default_addr, |e| e.local_apic_address())
    }

    /// Whether legacy 8259 PICs are present alongside the APICs.
    pub fn has_legacy_pics(&self) -> bool {
        self.flags & MADT_PCAT_COMPAT != 0
    }

    /// Iterate over the headers of all entries in this MADT.
    pub fn entry_headers(&self) -> MadtHeaderIter {
        unsafe {
            let first = self.records.as_ptr() as *const MadtEntryHeader;
            let last = (self as *const Madt as *const u8).add(self.header.length())
                as *const MadtEntryHeader;
            MadtHeaderIter {
                current: first,
                last,
            }
        }
    }

    /// Iterate over all typed MADT entries.
    pub fn entries(&self) -> impl Iterator<Item = MadtEntry> {
        self.entry_headers().map(MadtEntry::from_header)
    }

    pub fn local_apics(&self) -> impl Iterator<Item = &'static LocalApic> {
        self.entries().filter_map(|e| e.local_apic())
    }

    pub fn io_apics(&self) -> impl Iterator<Item = &'static IoApic> {
        self.entries().filter_map(|e| e.io_apic())
    }

    pub fn interrupt_source_overrides(
        &self,
    ) -> impl Iterator<Item = &'static InterruptSourceOverride> {
        self.entries().filter_map(|e| e.interrupt_source_override())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MadtHeaderIter {
    current: *const MadtEntryHeader,
    last: *const MadtEntryHeader,
}

impl Iterator for MadtHeaderIter {
    type Item = &'static MadtEntryHeader;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.last {
            None
        } else {
            unsafe {
                let header = &*self.current;
                let offset = (header.record_length as usize).max(1);
                self.current = (self.current as *const u8).add(offset) as *const MadtEntryHeader;
                Some(header)
            }
        }
    }
}

impl core::iter::FusedIterator for MadtHeaderIter {}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MadtEntry {
    LocalApic(&'static LocalApic),
    IoApic(&'static IoApic),
    InterruptSourceOverride(&'static InterruptSourceOverride),
    NonMaskableInterrupt(&'static NonMaskableInterrupt),
    LocalApicAddressOverride(&'static LocalApicAddressOverride),
    Unknown(&'static MadtEntryHeader),
}

impl MadtEntry {
    pub fn from_header(header: &'static MadtEntryHeader) -> MadtEntry {
        unsafe {
            match header.entry_type() {
                LocalApic::ENTRY_TYPE => MadtEntry::LocalApic(header.cast()),
                IoApic::ENTRY_TYPE => MadtEntry::IoApic(header.cast()),
                InterruptSourceOverride::ENTRY_TYPE => {
                    MadtEntry::InterruptSourceOverride(header.cast())
                }
                NonMaskableInterrupt::ENTRY_TYPE => {
                    MadtEntry::NonMaskableInterrupt(header.cast())
                }
                LocalApicAddressOverride::ENTRY_TYPE => {
                    MadtEntry::LocalApicAddressOverride(header.cast())
                }
                _ => MadtEntry::Unknown(header),
            }
        }
    }

    pub fn local_apic(&self) -> Option<&'static LocalApic> {
        match self {
            MadtEntry::LocalApic(this) => Some(this),
            _ => None,
        }
    }

    pub fn io_apic(&self) -> Option<&'static IoApic> {
        match self {
            MadtEntry::IoApic(this) => Some(this),
            _ => None,
        }
    }

    pub fn interrupt_source_override(&self) -> Option<&'static InterruptSourceOverride> {
        match self {
            MadtEntry::InterruptSourceOverride(this) => Some(this),
            _ => None,
        }
    }

    pub fn local_apic_address_override(&self) -> Option<&'static LocalApicAddressOverride> {
        match self {
            MadtEntry::LocalApicAddressOverride(this) => Some(this),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(C, packed)]
pub struct MadtEntryHeader {
    entry_type: u8,
    record_length: u8,
}

impl MadtEntryHeader {
    pub fn entry_type(&self) -> u8 {
        self.entry_type
    }

    /// # Safety
    ///
    /// The caller must know that the entry really has the layout of `T`.
    pub unsafe fn cast<T>(&self) -> &T {
        &*(self as *const MadtEntryHeader as *const T)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(C, packed)]
pub struct LocalApic {
    record_header: MadtEntryHeader,
    processor_id: u8,
    apic_id: u8,
    flags: u32,
}

impl LocalApic {
    pub const ENTRY_TYPE: u8 = 0;

    pub fn processor_id(&self) -> u8 {
        self.processor_id
    }

    pub fn apic_id(&self) -> u8 {
        self.apic_id
    }

    pub fn processor_enabled(&self) -> bool {
        self.flags & 1 != 0
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(C, packed)]
pub struct IoApic {
    record_header: MadtEntryHeader,
    io_apic_id: u8,
    reserved: u8,
    io_apic_address: u32,
    global_system_interrupt_base: u32,
}

impl IoApic {
    pub const ENTRY_TYPE: u8 = 1;

    pub fn id(&self) -> u8 {
        self.io_apic_id
    }

    pub fn address(&self) -> PhysAddr {
        PhysAddr(self.io_apic_address as usize)
    }

    /// The global system interrupt number where this IOAPIC's inputs start.
    pub fn global_system_interrupt_base(&self) -> u32 {
        self.global_system_interrupt_base
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(C, packed)]
pub struct InterruptSourceOverride {
    record_header: MadtEntryHeader,
    bus_source: u8,
    irq_source: u8,
    global_system_interrupt: u32,
    /// Bits 0-1: polarity, bits 2-3: trigger mode, rest reserved.
    flags: u16,
}

impl InterruptSourceOverride {
    pub const ENTRY_TYPE: u8 = 2;

    /// The legacy ISA IRQ number being rerouted.
    pub fn irq_source(&self) -> u8 {
        self.irq_source
    }

    /// The global system interrupt the IRQ is actually wired to.
    pub fn global_system_interrupt(&self) -> u32 {
        self.global_system_interrupt
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(C, packed)]
pub struct NonMaskableInterrupt {
    record_header: MadtEntryHeader,
    /// ACPI processor id, 0xFF meaning all processors.
    processor_id: u8,
    flags: u16,
    /// Local APIC input (LINTn) the NMI is connected to.
    lint: u8,
}

impl NonMaskableInterrupt {
    pub const ENTRY_TYPE: u8 = 4;

    pub fn processor_id(&self) -> u8 {
        self.processor_id
    }

    pub fn lint(&self) -> u8 {
        self.lint
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(C, packed)]
pub struct LocalApicAddressOverride {
    record_header: MadtEntryHeader,
    reserved: u16,
    local_apic_address: u64,
}

impl LocalApicAddressOverride {
    pub const ENTRY_TYPE: u8 = 5;

    pub fn local_apic_address(&self) -> PhysAddr {
        PhysAddr(self.local_apic_address as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{build_sdt, leak};
    use crate::AcpiTables;

    fn build_madt(entries: &[&[u8]]) -> &'static Madt {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0xFEE0_0000u32.to_le_bytes()); // local APIC address
        payload.extend_from_slice(&MADT_PCAT_COMPAT.to_le_bytes()); // flags
        for entry in entries {
            payload.extend_from_slice(entry);
        }
        let addr = leak(build_sdt(*b"APIC", &payload));

        let mut tables = AcpiTables::new();
        unsafe { tables.register(addr).unwrap() };
        tables.find_table::<Madt>(0).expect("MADT")
    }

    fn local_apic_entry(processor: u8, apic: u8, flags: u32) -> Vec<u8> {
        let mut raw = vec![LocalApic::ENTRY_TYPE, 8, processor, apic];
        raw.extend_from_slice(&flags.to_le_bytes());
        raw
    }

    fn io_apic_entry(id: u8, address: u32, gsi_base: u32) -> Vec<u8> {
        let mut raw = vec![IoApic::ENTRY_TYPE, 12, id, 0];
        raw.extend_from_slice(&address.to_le_bytes());
        raw.extend_from_slice(&gsi_base.to_le_bytes());
        raw
    }

    fn override_entry(irq: u8, gsi: u32) -> Vec<u8> {
        let mut raw = vec![InterruptSourceOverride::ENTRY_TYPE, 10, 0, irq];
        raw.extend_from_slice(&gsi.to_le_bytes());
        raw.extend_from_slice(&0u16.to_le_bytes());
        raw
    }

    #[test]
    fn madt_entry_walk() {
        let madt = build_madt(&[
            &local_apic_entry(0, 0, 1),
            &local_apic_entry(1, 1, 0),
            &io_apic_entry(1, 0xFEC0_0000, 0),
            &override_entry(0, 2),
        ]);

        assert!(madt.has_legacy_pics());
        assert_eq!(madt.local_apic_address(), PhysAddr(0xFEE0_0000));

        let apics: Vec<_> = madt.local_apics().collect();
        assert_eq!(apics.len(), 2);
        assert!(apics[0].processor_enabled());
        assert!(!apics[1].processor_enabled());

        let io_apics: Vec<_> = madt.io_apics().collect();
        assert_eq!(io_apics.len(), 1);
        assert_eq!(io_apics[0].address(), PhysAddr(0xFEC0_0000));
        assert_eq!(io_apics[0].global_system_interrupt_base(), 0);

        let overrides: Vec<_> = madt.interrupt_source_overrides().collect();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].irq_source(), 0);
        assert_eq!(overrides[0].global_system_interrupt(), 2);
    }

    #[test]
    fn local_apic_address_override_wins() {
        let mut entry = vec![LocalApicAddressOverride::ENTRY_TYPE, 12, 0, 0];
        entry.extend_from_slice(&0x0000_000F_EE00_0000u64.to_le_bytes());
        let madt = build_madt(&[&entry]);

        assert_eq!(madt.local_apic_address(), PhysAddr(0x0000_000F_EE00_0000));
    }
}
