//! Raw x86_64 CPU primitives. Everything here is a thin wrapper around a
//! single instruction; policy lives in the crates above.

pub mod io;

use core::arch::asm;

/// Pause the CPU until the next interrupt arrives.
#[inline]
pub unsafe fn hlt() {
    asm!("hlt", options(nomem, nostack));
}

/// Pause the CPU indefinitely. Interrupts may still arrive, depending on the
/// interrupt flag.
#[inline]
pub unsafe fn hang() -> ! {
    loop {
        hlt();
    }
}

/// Enable maskable interrupts on the current CPU.
#[inline]
pub unsafe fn enable_interrupts() {
    asm!("sti", options(nomem, nostack));
}

/// Disable maskable interrupts on the current CPU.
#[inline]
pub unsafe fn disable_interrupts() {
    asm!("cli", options(nomem, nostack));
}

/// RFLAGS bit 9: maskable interrupts enabled.
pub const RFLAGS_IF: u64 = 1 << 9;

/// Read the RFLAGS register.
#[inline]
pub fn read_rflags() -> u64 {
    let value: u64;
    unsafe {
        asm!("pushfq", "pop {}", out(reg) value, options(preserves_flags));
    }
    value
}

/// Whether maskable interrupts are enabled on the current CPU.
#[inline]
pub fn interrupts_enabled() -> bool {
    read_rflags() & RFLAGS_IF != 0
}

/// Execute the cpuid instruction after setting eax to the given query.
#[inline]
pub fn cpuid(query: u32) -> (u32, u32, u32, u32) {
    let (a, c, d): (u32, u32, u32);
    let b: u64;
    unsafe {
        // rbx is reserved by LLVM, bounce the result through a scratch register.
        asm!(
            "mov {tmp}, rbx",
            "cpuid",
            "xchg {tmp}, rbx",
            tmp = out(reg) b,
            inout("eax") query => a,
            out("ecx") c,
            out("edx") d,
            options(nomem, nostack),
        );
    }
    (a, b as u32, c, d)
}

/// CPUID leaf 1, EDX bit 9: on-chip APIC present.
pub fn has_apic() -> bool {
    let (_, _, _, edx) = cpuid(1);
    edx & (1 << 9) != 0
}

pub const MSR_APIC_BASE: u32 = 0x1B;

/// Read the value of a model specific register.
#[inline]
pub unsafe fn read_msr(msr: u32) -> u64 {
    let (lo, hi): (u32, u32);
    asm!("rdmsr", in("ecx") msr, out("eax") lo, out("edx") hi, options(nomem, nostack));
    (lo as u64) | ((hi as u64) << 32)
}

/// Write the value of a model specific register.
#[inline]
pub unsafe fn write_msr(msr: u32, value: u64) {
    let lo = value as u32;
    let hi = (value >> 32) as u32;
    asm!("wrmsr", in("ecx") msr, in("eax") lo, in("edx") hi, options(nomem, nostack));
}

/// Read the physical address of the active top-level page table.
#[inline]
pub unsafe fn read_cr3() -> usize {
    let value: usize;
    asm!("mov {}, cr3", out(reg) value, options(nomem, nostack));
    value & !0xFFF
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rflags_reserved_bit_reads_as_one() {
        // bit 1 is hardwired to one on every x86
        assert!(read_rflags() & 0x2 != 0);
    }

    #[test]
    fn user_mode_runs_with_interrupts_enabled() {
        assert!(interrupts_enabled());
    }
}
