//! The interrupt vector space and the CPU exception naming table.

/// Total number of interrupt vectors.
pub const VECTOR_COUNT: usize = 256;

/// Vectors below this are CPU exceptions, reserved by the architecture.
pub const EXCEPTION_COUNT: u8 = 32;

/// Vector that legacy IRQ 0 maps to by default. IRQs 0-15 occupy the two
/// blocks directly above the exception range.
pub const IRQ_BASE: u8 = 0x20;

/// Number of legacy ISA IRQ lines.
pub const LEGACY_IRQ_COUNT: usize = 16;

/// Vector the local APIC reports for spurious interrupts. Kept at the top
/// of the priority space, as convention demands.
pub const SPURIOUS_VECTOR: u8 = 0xFF;

/// Name of a CPU exception vector, for diagnostics.
pub fn exception_name(vector: u8) -> &'static str {
    match vector {
        0 => "divide error",
        1 => "debug",
        2 => "non-maskable interrupt",
        3 => "breakpoint",
        4 => "overflow",
        5 => "bound range exceeded",
        6 => "invalid opcode",
        7 => "device not available",
        8 => "double fault",
        9 => "coprocessor segment overrun",
        10 => "invalid TSS",
        11 => "segment not present",
        12 => "stack segment fault",
        13 => "general protection fault",
        14 => "page fault",
        16 => "x87 floating point exception",
        17 => "alignment check",
        18 => "machine check",
        19 => "SIMD floating point exception",
        20 => "virtualization exception",
        21 => "control protection exception",
        _ => "reserved exception",
    }
}

/// Whether the CPU pushes an error code for this exception vector.
pub fn has_error_code(vector: u8) -> bool {
    matches!(vector, 8 | 10 | 11 | 12 | 13 | 14 | 17 | 30)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exception_names() {
        assert_eq!(exception_name(14), "page fault");
        assert_eq!(exception_name(13), "general protection fault");
        assert_eq!(exception_name(15), "reserved exception");
    }

    #[test]
    fn error_code_vectors() {
        assert!(has_error_code(14));
        assert!(has_error_code(8));
        assert!(!has_error_code(0));
        assert!(!has_error_code(32));
    }
}
