//! The interrupt descriptor table.

use kbase::VirtAddr;
use kirq::vectors::VECTOR_COUNT;

use core::arch::asm;
use core::mem;

/// Selector of the flat kernel code segment set up by the boot loader.
const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// Gate type nibble for an interrupt gate: the CPU clears the interrupt
/// flag before entering the handler.
const INTERRUPT_GATE: u8 = 0x0E;

const PRESENT: u8 = 1 << 7;

#[derive(Clone, Copy, Eq, PartialEq)]
#[repr(C, packed)]
pub struct IdtEntry {
    offset_low: u16,
    selector: u16,
    reserved_ist: u8,
    /// `[P:1][DPL:2][MBZ:1][Type:4]`
    type_attr: u8,
    offset_middle: u16,
    offset_high: u32,
    reserved: u32,
}

assert_eq_size!(IdtEntry, [u8; 16]);

impl IdtEntry {
    pub const fn missing() -> IdtEntry {
        IdtEntry {
            offset_low: 0,
            selector: 0,
            reserved_ist: 0,
            type_attr: 0,
            offset_middle: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    /// A present kernel-mode interrupt gate pointing at `handler`.
    pub fn interrupt_gate(handler: VirtAddr) -> IdtEntry {
        let offset = handler.0 as u64;
        IdtEntry {
            offset_low: offset as u16,
            selector: KERNEL_CODE_SELECTOR,
            reserved_ist: 0,
            type_attr: PRESENT | INTERRUPT_GATE,
            offset_middle: (offset >> 16) as u16,
            offset_high: (offset >> 32) as u32,
            reserved: 0,
        }
    }
}

#[repr(C, align(16))]
pub struct Idt {
    entries: [IdtEntry; VECTOR_COUNT],
}

impl Idt {
    pub const fn new() -> Idt {
        Idt {
            entries: [IdtEntry::missing(); VECTOR_COUNT],
        }
    }
}

/// Operand of the `lidt` instruction.
#[repr(C, packed)]
struct Idtr {
    limit: u16,
    offset: u64,
}

static mut IDT: Idt = Idt::new();

/// Point every vector at its entry stub and activate the table.
///
/// # Safety
///
/// Must be called exactly once, before interrupts are enabled, with stubs
/// that stay resident for the lifetime of the kernel.
pub unsafe fn init(stubs: &[VirtAddr; VECTOR_COUNT]) {
    for (entry, stub) in IDT.entries.iter_mut().zip(stubs.iter()) {
        *entry = IdtEntry::interrupt_gate(*stub);
    }
    let idtr = Idtr {
        limit: (mem::size_of::<Idt>() - 1) as u16,
        offset: &IDT as *const Idt as u64,
    };
    asm!("lidt [{}]", in(reg) &idtr, options(readonly, nostack, preserves_flags));
}
