//! The architecture-isolated context switch seam.
//!
//! Everything above this module treats a saved context as an opaque resume
//! token; the hardware implementation at the bottom is the only
//! non-portable code in the crate.

use crate::task::TaskHandle;

/// Callee-saved register state, living on the owning task's stack in
/// exactly this order. The switch routine pushes and pops it.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SavedContext {
    /// RFLAGS of the suspended task. Restoring it keeps the interrupt
    /// flag a per-task property; a task switched to from interrupt
    /// context must not inherit the masked state of the interrupt path.
    pub rflags: u64,
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbx: u64,
    pub rbp: u64,
    /// Return address the switch routine's `ret` lands on.
    pub rip: u64,
}

assert_eq_size!(SavedContext, [u64; 8]);

/// The three context operations the scheduler needs.
pub trait ContextOps {
    /// Lay down the initial saved context on a fresh task's stack so the
    /// first switch into it lands in the entry trampoline.
    fn prepare(&self, task: TaskHandle);

    /// Save the current register state into `from` and resume `to`.
    /// Returns only when some other task later switches back to `from`.
    ///
    /// # Safety
    ///
    /// `to` must hold a valid saved context and must not be running.
    unsafe fn switch(&self, from: TaskHandle, to: TaskHandle);

    /// Resume `to` without saving any state. On hardware this never
    /// returns; the calling stack is abandoned.
    ///
    /// # Safety
    ///
    /// As for [`ContextOps::switch`].
    unsafe fn jump(&self, to: TaskHandle);
}

#[cfg(target_arch = "x86_64")]
pub use self::x86_64::HwContext;

#[cfg(target_arch = "x86_64")]
mod x86_64 {
    use super::{ContextOps, SavedContext};
    use crate::task::{task_main, TaskHandle};

    use core::arch::global_asm;
    use core::mem;

    // The switch primitive. rdi points at the outgoing task's context
    // slot, rsi at the incoming task's saved context. The frame layout
    // must match SavedContext.
    global_asm!(
        ".global __opal_context_switch",
        "__opal_context_switch:",
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "pushfq",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "popfq",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
        ".global __opal_context_jump",
        "__opal_context_jump:",
        "mov rsp, rdi",
        "popfq",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
        // first landing point of a fresh task: the task pointer was
        // parked in r12 by prepare()
        ".global __opal_task_entry",
        "__opal_task_entry:",
        "mov rdi, r12",
        "call {task_main}",
        task_main = sym task_main,
    );

    extern "C" {
        fn __opal_context_switch(save: *mut *mut SavedContext, resume: *mut SavedContext);
        fn __opal_context_jump(resume: *mut SavedContext) -> !;
        fn __opal_task_entry();
    }

    /// The real context operations backed by the switch routine above.
    pub struct HwContext;

    impl ContextOps for HwContext {
        fn prepare(&self, task: TaskHandle) {
            // consuming the frame leaves rsp back on the 16 byte boundary
            // at `top`; the trampoline's call then enters task_main with
            // the System V stack alignment
            let top = task.stack_top().align_down(16);
            let frame = (top.0 - mem::size_of::<SavedContext>()) as *mut SavedContext;
            let initial = SavedContext {
                // fresh tasks start with interrupts enabled
                rflags: kbase::cpu::RFLAGS_IF | 0x2,
                r15: 0,
                r14: 0,
                r13: 0,
                r12: task.as_ptr() as u64,
                rbx: 0,
                rbp: 0,
                rip: __opal_task_entry as usize as u64,
            };
            unsafe {
                frame.write(initial);
            }
            task.set_context(frame);
        }

        unsafe fn switch(&self, from: TaskHandle, to: TaskHandle) {
            let resume = to.context();
            debug_assert!(!resume.is_null());
            to.set_context(core::ptr::null_mut());
            __opal_context_switch(from.context_slot(), resume);
        }

        unsafe fn jump(&self, to: TaskHandle) {
            let resume = to.context();
            debug_assert!(!resume.is_null());
            to.set_context(core::ptr::null_mut());
            __opal_context_jump(resume);
        }
    }

    const _: () = assert!(mem::size_of::<SavedContext>() == 64);
}
