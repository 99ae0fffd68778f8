//! The 256 interrupt entry stubs and their common register save path.
//!
//! Each stub pushes a dummy error code where the CPU does not supply one,
//! pushes its vector number and jumps to the common path, which lays down
//! a complete [`kirq::TrapFrame`] and calls into the dispatcher.

use crate::kernel::interrupt_entry;

use kbase::VirtAddr;
use kirq::vectors::VECTOR_COUNT;

use core::arch::global_asm;

global_asm!(
    ".altmacro",
    // vectors 8, 10-14, 17 and 30 get an error code from the CPU, all
    // others need padding so the frame layout stays uniform
    ".macro vector_stub vec",
    ".align 8",
    "vector_stub_\\vec:",
    ".if (\\vec == 8) || (\\vec == 10) || (\\vec == 11) || (\\vec == 12) || (\\vec == 13) || (\\vec == 14) || (\\vec == 17) || (\\vec == 30)",
    ".else",
    "    push 0",
    ".endif",
    "    push \\vec",
    "    jmp vector_common",
    ".endm",
    ".macro vector_stub_ref vec",
    "    .quad vector_stub_\\vec",
    ".endm",
    // push order is the TrapFrame layout read bottom-up
    "vector_common:",
    "    push rax",
    "    push rbx",
    "    push rcx",
    "    push rdx",
    "    push rsi",
    "    push rdi",
    "    push rbp",
    "    push r8",
    "    push r9",
    "    push r10",
    "    push r11",
    "    push r12",
    "    push r13",
    "    push r14",
    "    push r15",
    "    mov rdi, rsp",
    "    call {entry}",
    "    pop r15",
    "    pop r14",
    "    pop r13",
    "    pop r12",
    "    pop r11",
    "    pop r10",
    "    pop r9",
    "    pop r8",
    "    pop rbp",
    "    pop rdi",
    "    pop rsi",
    "    pop rdx",
    "    pop rcx",
    "    pop rbx",
    "    pop rax",
    // drop vector and error code
    "    add rsp, 16",
    "    iretq",
    ".set vec_index, 0",
    ".rept 256",
    "    vector_stub %vec_index",
    "    .set vec_index, vec_index + 1",
    ".endr",
    ".align 8",
    ".global VECTOR_STUBS",
    "VECTOR_STUBS:",
    ".set vec_index, 0",
    ".rept 256",
    "    vector_stub_ref %vec_index",
    "    .set vec_index, vec_index + 1",
    ".endr",
    entry = sym interrupt_entry,
);

extern "C" {
    /// Entry addresses of all stubs, indexed by vector. Defined by the
    /// assembly block above.
    pub static VECTOR_STUBS: [VirtAddr; VECTOR_COUNT];
}
