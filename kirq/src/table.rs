//! The vector-to-handler dispatch table.

use kbase::KernelError;

use crate::frame::TrapFrame;
use crate::vectors::{EXCEPTION_COUNT, VECTOR_COUNT};

/// An interrupt handler. Returns whether it claimed the interrupt; a
/// declined interrupt falls through to the unhandled policy.
pub type Handler = fn(vector: u8, frame: &mut TrapFrame) -> bool;

/// Maps every vector to at most one handler. IRQ sharing is deliberately
/// not supported.
pub struct VectorTable {
    handlers: [Option<Handler>; VECTOR_COUNT],
}

impl VectorTable {
    pub const fn new() -> VectorTable {
        VectorTable {
            handlers: [None; VECTOR_COUNT],
        }
    }

    /// Register a handler for a device or software interrupt vector.
    ///
    /// Exception vectors cannot take handlers; they are always fatal.
    /// A vector that already has a handler stays untouched.
    pub fn register(&mut self, vector: u8, handler: Handler) -> Result<(), KernelError> {
        if vector < EXCEPTION_COUNT {
            return Err(KernelError::InvalidArgument);
        }
        let slot = &mut self.handlers[vector as usize];
        if slot.is_some() {
            return Err(KernelError::Conflict);
        }
        *slot = Some(handler);
        Ok(())
    }

    /// Drop a registration again, e.g. when enabling the line failed.
    pub(crate) fn unregister(&mut self, vector: u8) {
        self.handlers[vector as usize] = None;
    }

    pub fn lookup(&self, vector: u8) -> Option<Handler> {
        self.handlers[vector as usize]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn noop(_vector: u8, _frame: &mut TrapFrame) -> bool {
        true
    }

    fn decline(_vector: u8, _frame: &mut TrapFrame) -> bool {
        false
    }

    #[test]
    fn exception_vectors_are_reserved() {
        let mut table = VectorTable::new();
        assert_eq!(table.register(0, noop), Err(KernelError::InvalidArgument));
        assert_eq!(table.register(31, noop), Err(KernelError::InvalidArgument));
        assert_eq!(table.register(32, noop), Ok(()));
    }

    #[test]
    fn double_registration_keeps_first_handler() {
        let mut table = VectorTable::new();
        table.register(0x40, noop).unwrap();
        assert_eq!(table.register(0x40, decline), Err(KernelError::Conflict));

        let handler = table.lookup(0x40).expect("handler must survive");
        assert!(handler == noop as Handler);
    }

    #[test]
    fn unregistered_vector_has_no_handler() {
        let table = VectorTable::new();
        assert!(table.lookup(0x80).is_none());
    }
}
