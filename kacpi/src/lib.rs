//! Minimal ACPI support: system description table headers with checksum
//! validation, a registry with typed table lookup, and the MADT.
//!
//! The kernel maps each firmware table into its address space and registers
//! it here; everything above only ever asks `find_table` for a typed view.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate static_assertions;

pub mod madt;
pub mod rsdt;
pub mod util;

pub use self::madt::Madt;
pub use self::rsdt::{Rsdt, Xsdt};

use kbase::{KernelError, VirtAddr};

/// Header common to all ACPI system description tables.
#[repr(C, packed)]
pub struct SdtHeader {
    signature: [u8; 4],
    length: u32,
    revision: u8,
    checksum: u8,
    oem_id: [u8; 6],
    oem_table_id: [u8; 8],
    oem_revision: u32,
    creator_id: u32,
    creator_revision: u32,
}

assert_eq_size!(SdtHeader, [u8; 36]);

impl SdtHeader {
    pub fn signature(&self) -> [u8; 4] {
        self.signature
    }

    pub fn length(&self) -> usize {
        self.length as usize
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }
}

/// A typed view of an ACPI table, obtained from an [`AnySdt`] by signature.
///
/// # Safety
///
/// Implementors must be `repr(C, packed)` structs that start with an
/// [`SdtHeader`] and match the firmware layout of the signature they claim.
pub unsafe trait AcpiTable: Sized {
    const SIGNATURE: [u8; 4];

    fn header(&self) -> &SdtHeader;

    fn from_any(any: &AnySdt) -> Option<&Self> {
        if any.signature() == Self::SIGNATURE {
            Some(unsafe { &*(any as *const AnySdt as *const Self) })
        } else {
            None
        }
    }
}

/// A generic ACPI table providing only the common header.
#[repr(C, packed)]
pub struct AnySdt {
    header: SdtHeader,
}

impl AnySdt {
    pub fn signature(&self) -> [u8; 4] {
        self.header.signature()
    }

    pub fn length(&self) -> usize {
        self.header.length()
    }

    pub fn is_valid(&self) -> bool {
        unsafe { util::table_checksum(&self.header) == 0 }
    }
}

/// Acquire a reference to a generic ACPI table from a raw virtual address,
/// verifying its checksum.
///
/// # Safety
///
/// `table_addr` must point at a mapping covering the table's self-reported
/// length.
pub unsafe fn table_from_raw(table_addr: VirtAddr) -> Option<&'static AnySdt> {
    let table: &'static AnySdt = &*table_addr.as_ptr();
    if table.is_valid() {
        Some(table)
    } else {
        None
    }
}

/// Upper bound on the number of tables we keep track of. Firmware usually
/// ships about a dozen.
pub const MAX_TABLES: usize = 32;

/// Registry of all mapped system description tables.
pub struct AcpiTables {
    tables: [VirtAddr; MAX_TABLES],
    len: usize,
}

impl AcpiTables {
    pub const fn new() -> AcpiTables {
        AcpiTables {
            tables: [VirtAddr(0); MAX_TABLES],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Register a mapped table after verifying its checksum.
    ///
    /// # Safety
    ///
    /// `addr` must point at a mapping covering the table's self-reported
    /// length, and the mapping must stay valid for the lifetime of the
    /// registry.
    pub unsafe fn register(&mut self, addr: VirtAddr) -> Result<(), KernelError> {
        let table = match table_from_raw(addr) {
            Some(table) => table,
            None => {
                warn!("discarding ACPI table at {:p} with bad checksum", addr);
                return Err(KernelError::InvalidArgument);
            }
        };
        if self.len == MAX_TABLES {
            return Err(KernelError::OutOfMemory);
        }
        debug!(
            "ACPI table {} ({} bytes) at {:p}",
            core::str::from_utf8(&table.signature()).unwrap_or("????"),
            table.length(),
            addr
        );
        self.tables[self.len] = addr;
        self.len += 1;
        Ok(())
    }

    /// Iterate over all registered tables.
    pub fn iter(&self) -> impl Iterator<Item = &'static AnySdt> + '_ {
        self.tables[..self.len]
            .iter()
            .map(|addr| unsafe { &*addr.as_ptr::<AnySdt>() })
    }

    /// Find the `index`-th table with the signature of `T`.
    ///
    /// Most signatures appear at most once, so `index` is almost always 0.
    pub fn find_table<T: AcpiTable>(&self, index: usize) -> Option<&'static T> {
        self.iter().filter_map(T::from_any).nth(index)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{build_sdt, leak};

    #[test]
    fn register_rejects_bad_checksum() {
        let mut raw = build_sdt(*b"TEST", &[]);
        raw[9] = raw[9].wrapping_add(1); // corrupt the checksum byte
        let addr = leak(raw);

        let mut tables = AcpiTables::new();
        assert_eq!(
            unsafe { tables.register(addr) },
            Err(KernelError::InvalidArgument)
        );
        assert!(tables.is_empty());
    }

    #[test]
    fn find_table_by_signature_and_index() {
        let mut tables = AcpiTables::new();
        unsafe {
            tables.register(leak(build_sdt(*b"TST0", &[1]))).unwrap();
            tables.register(leak(build_sdt(*b"TST1", &[2]))).unwrap();
            tables.register(leak(build_sdt(*b"TST1", &[3]))).unwrap();
        }
        assert_eq!(tables.len(), 3);

        #[repr(C, packed)]
        struct Tst1 {
            header: SdtHeader,
            payload: u8,
        }
        unsafe impl AcpiTable for Tst1 {
            const SIGNATURE: [u8; 4] = *b"TST1";
            fn header(&self) -> &SdtHeader {
                &self.header
            }
        }

        let first = tables.find_table::<Tst1>(0).expect("first TST1");
        assert_eq!(first.payload, 2);
        let second = tables.find_table::<Tst1>(1).expect("second TST1");
        assert_eq!(second.payload, 3);
        assert!(tables.find_table::<Tst1>(2).is_none());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use kbase::VirtAddr;

    /// Assemble a valid SDT with the given signature and payload.
    pub fn build_sdt(signature: [u8; 4], payload: &[u8]) -> Vec<u8> {
        let length = 36 + payload.len();
        let mut raw = Vec::new();
        raw.extend_from_slice(&signature);
        raw.extend_from_slice(&(length as u32).to_le_bytes());
        raw.push(1); // revision
        raw.push(0); // checksum, patched below
        raw.extend_from_slice(b"OEMID ");
        raw.extend_from_slice(b"OEMTABLE");
        raw.extend_from_slice(&1u32.to_le_bytes()); // oem revision
        raw.extend_from_slice(&0u32.to_le_bytes()); // creator id
        raw.extend_from_slice(&0u32.to_le_bytes()); // creator revision
        raw.extend_from_slice(payload);
        assert_eq!(raw.len(), length);

        let sum = crate::util::checksum(&raw);
        raw[9] = (!sum).wrapping_add(1);
        assert_eq!(crate::util::checksum(&raw), 0);
        raw
    }

    /// Pin a table buffer for the rest of the test process.
    pub fn leak(raw: Vec<u8>) -> VirtAddr {
        let slice: &'static [u8] = Box::leak(raw.into_boxed_slice());
        VirtAddr(slice.as_ptr() as usize)
    }
}
