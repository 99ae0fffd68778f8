//! The seam between vector-level dispatch policy and the actual interrupt
//! controller hardware.

use kbase::KernelError;

/// Operations the dispatch layer needs from an interrupt controller.
///
/// All methods work in vector space; each backend translates vectors back
/// to its own line numbering.
pub trait IrqController {
    /// Human readable name for log records.
    fn name(&self) -> &'static str;

    /// Whether the interrupt on `vector` is a controller artifact that must
    /// be dropped without an end-of-interrupt.
    fn is_spurious(&mut self, vector: u8) -> bool;

    /// Signal end-of-interrupt for `vector`.
    fn acknowledge(&mut self, vector: u8);

    /// Unmask the line behind `vector` and clear latched pending state.
    fn enable(&mut self, vector: u8) -> Result<(), KernelError>;

    /// Mask the line behind `vector`.
    fn disable(&mut self, vector: u8) -> Result<(), KernelError>;
}
