//! The register state captured by the interrupt entry stubs.

use core::fmt;

/// Register state at the moment of an interrupt or exception, in the order
/// the entry stubs push it. The last five fields are pushed by the CPU.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    /// Vector number, pushed by the per-vector stub.
    pub vector: u64,
    /// Error code pushed by the CPU, or 0 for vectors without one.
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

assert_eq_size!(TrapFrame, [u64; 22]);

impl fmt::Display for TrapFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "RIP={:016x} CS={:04x} RFLAGS={:016x}",
            self.rip, self.cs, self.rflags
        )?;
        writeln!(
            f,
            "RSP={:016x} SS={:04x} ERR={:016x}",
            self.rsp, self.ss, self.error_code
        )?;
        writeln!(
            f,
            "RAX={:016x} RBX={:016x} RCX={:016x} RDX={:016x}",
            self.rax, self.rbx, self.rcx, self.rdx
        )?;
        writeln!(
            f,
            "RSI={:016x} RDI={:016x} RBP={:016x} R8 ={:016x}",
            self.rsi, self.rdi, self.rbp, self.r8
        )?;
        writeln!(
            f,
            "R9 ={:016x} R10={:016x} R11={:016x} R12={:016x}",
            self.r9, self.r10, self.r11, self.r12
        )?;
        write!(
            f,
            "R13={:016x} R14={:016x} R15={:016x}",
            self.r13, self.r14, self.r15
        )
    }
}

impl TrapFrame {
    /// An all-zero frame, used by tests that synthesize dispatches.
    pub const fn empty() -> TrapFrame {
        TrapFrame {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            vector: 0,
            error_code: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::TrapFrame;

    #[test]
    fn dump_contains_instruction_pointer() {
        let mut frame = TrapFrame::empty();
        frame.rip = 0xFFFF_8000_DEAD_BEEF;
        let dump = format!("{}", frame);
        assert!(dump.contains("ffff8000deadbeef"));
    }
}
