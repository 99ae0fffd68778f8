//! Backend for the legacy dual 8259 PIC.

use kbase::cpu::io::{inb, outb, PortNumber};
use kbase::KernelError;

use crate::controller::IrqController;
use crate::vectors::LEGACY_IRQ_COUNT;

const PIC1_CMD: PortNumber = PortNumber(0x0020);
const PIC1_DATA: PortNumber = PortNumber(0x0021);
const PIC2_CMD: PortNumber = PortNumber(0x00A0);
const PIC2_DATA: PortNumber = PortNumber(0x00A1);

/// ICW4 needed
const ICW1_ICW4: u8 = 0x01;
/// Initialization
const ICW1_INIT: u8 = 0x10;
/// 8086/88 mode
const ICW4_8086: u8 = 0x01;

/// OCW2 end of interrupt
const OCW2_EOI: u8 = 0x20;
/// OCW3 read in-service register
const OCW3_READ_ISR: u8 = 0x0B;

/// The two cascaded legacy PICs, remapped to a contiguous 16 vector block.
pub struct DualPic {
    base_vector: u8,
}

impl DualPic {
    /// Reinitialize both PICs to deliver IRQs 0-15 at
    /// `base_vector..base_vector + 16`, with every line masked.
    ///
    /// # Safety
    ///
    /// Reprograms the interrupt controller; the caller must be the only
    /// code doing so, with interrupts disabled.
    pub unsafe fn new(base_vector: u8) -> DualPic {
        // ICW1: start initialization in cascade mode
        outb(PIC1_CMD, ICW1_INIT | ICW1_ICW4);
        outb(PIC2_CMD, ICW1_INIT | ICW1_ICW4);
        // ICW2: vector offsets
        outb(PIC1_DATA, base_vector);
        outb(PIC2_DATA, base_vector + 8);
        // ICW3: the slave hangs off IRQ 2 of the master
        outb(PIC1_DATA, 1 << 2);
        outb(PIC2_DATA, 2);
        // ICW4: 8086 mode
        outb(PIC1_DATA, ICW4_8086);
        outb(PIC2_DATA, ICW4_8086);
        // start with everything masked
        outb(PIC1_DATA, 0xFF);
        outb(PIC2_DATA, 0xFF);

        DualPic { base_vector }
    }

    /// Mask every line on both PICs, e.g. before switching to the APICs.
    ///
    /// # Safety
    ///
    /// See [`DualPic::new`].
    pub unsafe fn mask_all() {
        outb(PIC1_DATA, 0xFF);
        outb(PIC2_DATA, 0xFF);
    }

    fn irq_of(&self, vector: u8) -> Result<u8, KernelError> {
        let irq = vector.wrapping_sub(self.base_vector);
        if (irq as usize) < LEGACY_IRQ_COUNT {
            Ok(irq)
        } else {
            Err(KernelError::InvalidArgument)
        }
    }

    unsafe fn in_service(cmd_port: PortNumber) -> u8 {
        outb(cmd_port, OCW3_READ_ISR);
        inb(cmd_port)
    }
}

impl IrqController for DualPic {
    fn name(&self) -> &'static str {
        "8259 PIC"
    }

    fn is_spurious(&mut self, vector: u8) -> bool {
        let irq = match self.irq_of(vector) {
            Ok(irq) => irq,
            Err(_) => return false,
        };
        // a spurious interrupt arrives on the lowest-priority line of the
        // raising PIC without a bit in its in-service register
        unsafe {
            match irq {
                7 => Self::in_service(PIC1_CMD) & 0x80 == 0,
                15 => {
                    if Self::in_service(PIC2_CMD) & 0x80 == 0 {
                        // the cascade line on the master was real and
                        // still needs its end-of-interrupt
                        outb(PIC1_CMD, OCW2_EOI);
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            }
        }
    }

    fn acknowledge(&mut self, vector: u8) {
        if let Ok(irq) = self.irq_of(vector) {
            unsafe {
                if irq >= 8 {
                    outb(PIC2_CMD, OCW2_EOI);
                }
                outb(PIC1_CMD, OCW2_EOI);
            }
        }
    }

    fn enable(&mut self, vector: u8) -> Result<(), KernelError> {
        let irq = self.irq_of(vector)?;
        unsafe {
            if irq < 8 {
                let mask = inb(PIC1_DATA) & !(1 << irq);
                outb(PIC1_DATA, mask);
            } else {
                let mask = inb(PIC2_DATA) & !(1 << (irq - 8));
                outb(PIC2_DATA, mask);
                // the cascade line must be open for slave interrupts
                let master = inb(PIC1_DATA) & !(1 << 2);
                outb(PIC1_DATA, master);
            }
        }
        Ok(())
    }

    fn disable(&mut self, vector: u8) -> Result<(), KernelError> {
        let irq = self.irq_of(vector)?;
        unsafe {
            if irq < 8 {
                let mask = inb(PIC1_DATA) | 1 << irq;
                outb(PIC1_DATA, mask);
            } else {
                let mask = inb(PIC2_DATA) | 1 << (irq - 8);
                outb(PIC2_DATA, mask);
            }
        }
        Ok(())
    }
}
