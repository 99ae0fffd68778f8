//! The root system description tables, pointing at every other table.

use kbase::PhysAddr;

use crate::{AcpiTable, SdtHeader};

use core::mem;

/// Root System Description Table, with 32 bit table pointers.
#[repr(C, packed)]
pub struct Rsdt {
    header: SdtHeader,
    // table pointers follow as unaligned little endian u32s
    entries: [u8; 0],
}

unsafe impl AcpiTable for Rsdt {
    const SIGNATURE: [u8; 4] = *b"RSDT";

    fn header(&self) -> &SdtHeader {
        &self.header
    }
}

impl Rsdt {
    pub fn entry_count(&self) -> usize {
        (self.header.length() - mem::size_of::<SdtHeader>()) / mem::size_of::<u32>()
    }

    /// Physical addresses of all tables listed in this RSDT.
    pub fn entries(&self) -> impl Iterator<Item = PhysAddr> + '_ {
        let base = self.entries.as_ptr() as *const u32;
        (0..self.entry_count()).map(move |i| {
            // the table is packed, read entries unaligned
            let raw = unsafe { base.add(i).read_unaligned() };
            PhysAddr(raw as usize)
        })
    }
}

/// Extended System Description Table, with 64 bit table pointers.
#[repr(C, packed)]
pub struct Xsdt {
    header: SdtHeader,
    // table pointers follow as unaligned little endian u64s
    entries: [u8; 0],
}

unsafe impl AcpiTable for Xsdt {
    const SIGNATURE: [u8; 4] = *b"XSDT";

    fn header(&self) -> &SdtHeader {
        &self.header
    }
}

impl Xsdt {
    pub fn entry_count(&self) -> usize {
        (self.header.length() - mem::size_of::<SdtHeader>()) / mem::size_of::<u64>()
    }

    /// Physical addresses of all tables listed in this XSDT.
    pub fn entries(&self) -> impl Iterator<Item = PhysAddr> + '_ {
        let base = self.entries.as_ptr() as *const u64;
        (0..self.entry_count()).map(move |i| {
            let raw = unsafe { base.add(i).read_unaligned() };
            PhysAddr(raw as usize)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{build_sdt, leak};
    use crate::AcpiTables;

    #[test]
    fn rsdt_entries() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x1000_0000u32.to_le_bytes());
        payload.extend_from_slice(&0x2000_0000u32.to_le_bytes());
        let raw = build_sdt(*b"RSDT", &payload);

        let mut tables = AcpiTables::new();
        unsafe { tables.register(leak(raw)).unwrap() };
        let rsdt = tables.find_table::<Rsdt>(0).expect("RSDT");

        assert_eq!(rsdt.entry_count(), 2);
        let entries: Vec<_> = rsdt.entries().collect();
        assert_eq!(entries, vec![PhysAddr(0x1000_0000), PhysAddr(0x2000_0000)]);
    }

    #[test]
    fn xsdt_entries() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0xFEE0_0000_1000u64.to_le_bytes());
        let raw = build_sdt(*b"XSDT", &payload);

        let mut tables = AcpiTables::new();
        unsafe { tables.register(leak(raw)).unwrap() };
        let xsdt = tables.find_table::<Xsdt>(0).expect("XSDT");

        assert_eq!(xsdt.entry_count(), 1);
        assert_eq!(xsdt.entries().next(), Some(PhysAddr(0xFEE0_0000_1000)));
    }
}
