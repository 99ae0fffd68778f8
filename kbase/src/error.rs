//! The error taxonomy shared by all kernel subsystems.
//!
//! Low-level components report failures through this type and never halt the
//! system themselves; escalation to a halt is the prerogative of the topmost
//! initialization code and the CPU-exception path.

use core::fmt;

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum KernelError {
    /// Malformed input, such as an out-of-range vector number or a zero-sized
    /// allocation request.
    InvalidArgument,
    /// The allocator cannot satisfy the request.
    OutOfMemory,
    /// The requested resource is already claimed, e.g. a vector that already
    /// has a handler.
    Conflict,
    /// The hardware or firmware does not expose the requested feature.
    Unsupported,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            KernelError::InvalidArgument => "invalid argument",
            KernelError::OutOfMemory => "out of memory",
            KernelError::Conflict => "resource conflict",
            KernelError::Unsupported => "unsupported operation",
        };
        f.write_str(msg)
    }
}
