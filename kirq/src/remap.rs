//! Translation of legacy ISA IRQ numbers into the dispatch vector space.

use kacpi::Madt;
use kbase::KernelError;

use crate::vectors::{IRQ_BASE, LEGACY_IRQ_COUNT, SPURIOUS_VECTOR};

/// Maps legacy IRQs 0-15 to interrupt vectors. By default IRQ n lands on
/// vector `IRQ_BASE + n`; firmware interrupt source overrides reroute
/// individual lines (the classic case being the PIT timer on IRQ 0
/// arriving at global system interrupt 2).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LegacyRemap {
    vectors: [u8; LEGACY_IRQ_COUNT],
}

impl LegacyRemap {
    /// The identity mapping used with the legacy PIC, which knows nothing
    /// about overrides.
    pub const fn identity() -> LegacyRemap {
        let mut vectors = [0u8; LEGACY_IRQ_COUNT];
        let mut irq = 0;
        while irq < LEGACY_IRQ_COUNT {
            vectors[irq] = IRQ_BASE + irq as u8;
            irq += 1;
        }
        LegacyRemap { vectors }
    }

    /// Identity mapping adjusted by the MADT's interrupt source overrides.
    pub fn from_madt(madt: &Madt) -> LegacyRemap {
        let mut remap = LegacyRemap::identity();
        for source_override in madt.interrupt_source_overrides() {
            let irq = source_override.irq_source() as usize;
            let gsi = source_override.global_system_interrupt();
            if irq >= LEGACY_IRQ_COUNT || gsi >= (SPURIOUS_VECTOR - IRQ_BASE) as u32 {
                warn!(
                    "ignoring out-of-range interrupt override: IRQ {} -> GSI {}",
                    irq, gsi
                );
                continue;
            }
            remap.vectors[irq] = IRQ_BASE + gsi as u8;
        }
        remap
    }

    /// The vector that the given legacy IRQ arrives at.
    pub fn vector(&self, irq: u8) -> Result<u8, KernelError> {
        self.vectors
            .get(irq as usize)
            .copied()
            .ok_or(KernelError::InvalidArgument)
    }

    /// Reverse lookup: the legacy IRQ delivered on `vector`, if any.
    pub fn irq_for_vector(&self, vector: u8) -> Option<u8> {
        self.vectors
            .iter()
            .position(|&v| v == vector)
            .map(|irq| irq as u8)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identity_mapping() {
        let remap = LegacyRemap::identity();
        assert_eq!(remap.vector(0), Ok(IRQ_BASE));
        assert_eq!(remap.vector(15), Ok(IRQ_BASE + 15));
        assert_eq!(remap.vector(16), Err(KernelError::InvalidArgument));
        assert_eq!(remap.irq_for_vector(IRQ_BASE + 7), Some(7));
        assert_eq!(remap.irq_for_vector(0x60), None);
    }

    /// Assemble a checksum-valid MADT with a single interrupt source
    /// override entry and leak it.
    fn build_madt_with_override(irq: u8, gsi: u32) -> &'static Madt {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"APIC");
        raw.extend_from_slice(&(36u32 + 8 + 10).to_le_bytes());
        raw.push(1); // revision
        raw.push(0); // checksum, patched below
        raw.extend_from_slice(b"OEMID ");
        raw.extend_from_slice(b"OEMTABLE");
        raw.extend_from_slice(&[0u8; 12]); // oem revision, creator id + revision
        raw.extend_from_slice(&0xFEE0_0000u32.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&[2, 10, 0, irq]);
        raw.extend_from_slice(&gsi.to_le_bytes());
        raw.extend_from_slice(&0u16.to_le_bytes());

        let sum = raw.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        raw[9] = (!sum).wrapping_add(1);

        let slice: &'static [u8] = Box::leak(raw.into_boxed_slice());
        unsafe { &*(slice.as_ptr() as *const Madt) }
    }

    #[test]
    fn madt_override_reroutes_single_line() {
        let madt = build_madt_with_override(0, 2);
        let remap = LegacyRemap::from_madt(madt);

        assert_eq!(remap.vector(0), Ok(IRQ_BASE + 2));
        assert_eq!(remap.vector(1), Ok(IRQ_BASE + 1));
        assert_eq!(remap.irq_for_vector(IRQ_BASE + 2), Some(0));
    }

    #[test]
    fn madt_override_out_of_range_is_ignored() {
        let madt = build_madt_with_override(0, 0x1000);
        let remap = LegacyRemap::from_madt(madt);
        assert_eq!(remap.vector(0), Ok(IRQ_BASE));
    }
}
