//! Vector-level dispatch policy tying the table, the remap and the
//! controller backend together.

use kbase::KernelError;

use crate::controller::IrqController;
use crate::frame::TrapFrame;
use crate::remap::LegacyRemap;
use crate::table::{Handler, VectorTable};
use crate::vectors::{exception_name, EXCEPTION_COUNT};

use core::sync::atomic::{AtomicBool, Ordering};

/// Deferred reschedule request, set by handlers and consumed by `dispatch`.
static RESCHEDULE_PENDING: AtomicBool = AtomicBool::new(false);

/// Ask the scheduler to run once the interrupt-return path completes.
/// Callable from interrupt handlers.
pub fn request_reschedule() {
    RESCHEDULE_PENDING.store(true, Ordering::Release);
}

fn take_reschedule_request() -> bool {
    RESCHEDULE_PENDING.swap(false, Ordering::AcqRel)
}

/// Outcome of dispatching one interrupt, telling the entry stub what to do
/// before returning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Dispatch {
    /// A handler claimed the interrupt and it was acknowledged.
    Handled,
    /// As `Handled`, and a handler asked for the scheduler to run before
    /// task code resumes.
    Reschedule,
    /// A controller artifact, dropped without acknowledgment.
    Spurious,
    /// No handler claimed a device vector; the line was masked and the
    /// interrupt acknowledged so level-triggered lines cannot storm.
    Unhandled,
    /// An unrecoverable CPU exception. The caller must halt the system.
    Fatal,
}

/// The interrupt subsystem: one dispatch table, one legacy IRQ remapping,
/// one controller backend.
pub struct InterruptSystem<C: IrqController> {
    table: VectorTable,
    remap: LegacyRemap,
    controller: C,
}

impl<C: IrqController> InterruptSystem<C> {
    pub fn new(controller: C, remap: LegacyRemap) -> InterruptSystem<C> {
        InterruptSystem {
            table: VectorTable::new(),
            remap,
            controller,
        }
    }

    pub fn remap(&self) -> &LegacyRemap {
        &self.remap
    }

    /// Register a handler for a legacy ISA IRQ, routing it through the
    /// remap table. Returns the vector the IRQ arrives at.
    pub fn register_irq(&mut self, irq: u8, handler: Handler) -> Result<u8, KernelError> {
        let vector = self.remap.vector(irq)?;
        self.register_vector(vector, handler)?;
        Ok(vector)
    }

    /// Register a handler for a raw interrupt vector and unmask its line at
    /// the controller.
    pub fn register_vector(&mut self, vector: u8, handler: Handler) -> Result<(), KernelError> {
        self.table.register(vector, handler)?;
        if let Err(err) = self.controller.enable(vector) {
            self.table.unregister(vector);
            return Err(err);
        }
        info!(
            "vector {:#04x} registered and enabled at the {}",
            vector,
            self.controller.name()
        );
        Ok(())
    }

    /// Route one interrupt or exception. Called from the entry stubs with
    /// interrupts disabled; never called by users.
    pub fn dispatch(&mut self, frame: &mut TrapFrame) -> Dispatch {
        let vector = frame.vector as u8;

        if self.controller.is_spurious(vector) {
            debug!(
                "dropping spurious interrupt on vector {:#04x} ({})",
                vector,
                self.controller.name()
            );
            return Dispatch::Spurious;
        }

        if vector < EXCEPTION_COUNT {
            error!(
                "fatal CPU exception {:#04x}: {}\n{}",
                vector,
                exception_name(vector),
                frame
            );
            return Dispatch::Fatal;
        }

        if let Some(handler) = self.table.lookup(vector) {
            if handler(vector, frame) {
                self.controller.acknowledge(vector);
                return if take_reschedule_request() {
                    Dispatch::Reschedule
                } else {
                    Dispatch::Handled
                };
            }
            error!("handler declined interrupt on vector {:#04x}", vector);
        }

        // nobody claims this line: mask it so a level-triggered device
        // cannot storm, then acknowledge what is already latched
        if let Err(err) = self.controller.disable(vector) {
            warn!("cannot mask unhandled vector {:#04x}: {}", vector, err);
        }
        self.controller.acknowledge(vector);
        error!(
            "unhandled interrupt on vector {:#04x}, line masked until a handler registers",
            vector
        );
        Dispatch::Unhandled
    }
}

#[cfg(target_arch = "x86_64")]
pub use self::hardware::{initialize, SystemController};

#[cfg(target_arch = "x86_64")]
mod hardware {
    use super::InterruptSystem;
    use crate::apic::{ApicChip, IoApicRegs, LocalApic};
    use crate::controller::IrqController;
    use crate::pic::DualPic;
    use crate::remap::LegacyRemap;
    use crate::vectors::IRQ_BASE;

    use kacpi::Madt;
    use kbase::KernelError;
    use kmm::map::MemoryMap;
    use kmm::paging::PageFlags;
    use kmm::MemoryMapper;

    /// Whichever controller generation the firmware gave us.
    pub enum SystemController {
        Pic(DualPic),
        Apic(ApicChip),
    }

    // the kernel parks the system behind a locked global
    assert_impl_all!(InterruptSystem<SystemController>: Send);

    impl IrqController for SystemController {
        fn name(&self) -> &'static str {
            match self {
                SystemController::Pic(pic) => pic.name(),
                SystemController::Apic(apic) => apic.name(),
            }
        }

        fn is_spurious(&mut self, vector: u8) -> bool {
            match self {
                SystemController::Pic(pic) => pic.is_spurious(vector),
                SystemController::Apic(apic) => apic.is_spurious(vector),
            }
        }

        fn acknowledge(&mut self, vector: u8) {
            match self {
                SystemController::Pic(pic) => pic.acknowledge(vector),
                SystemController::Apic(apic) => apic.acknowledge(vector),
            }
        }

        fn enable(&mut self, vector: u8) -> Result<(), KernelError> {
            match self {
                SystemController::Pic(pic) => pic.enable(vector),
                SystemController::Apic(apic) => apic.enable(vector),
            }
        }

        fn disable(&mut self, vector: u8) -> Result<(), KernelError> {
            match self {
                SystemController::Pic(pic) => pic.disable(vector),
                SystemController::Apic(apic) => apic.disable(vector),
            }
        }
    }

    /// Pick and initialize the interrupt controller generation.
    ///
    /// A missing MADT or a missing IOAPIC entry degrades to the legacy PIC
    /// with a warning; only a failure to map controller registers is an
    /// error.
    pub fn initialize(
        madt: Option<&Madt>,
        apic_supported: bool,
        map: &mut MemoryMap,
        mapper: &mut impl MemoryMapper,
    ) -> Result<InterruptSystem<SystemController>, KernelError> {
        if let (Some(madt), true) = (madt, apic_supported) {
            if let Some(io_apic) = madt.io_apics().next() {
                let flags = PageFlags::PRESENT
                    | PageFlags::WRITABLE
                    | PageFlags::CACHE_DISABLE
                    | PageFlags::WRITE_THROUGH
                    | PageFlags::NO_EXECUTE;
                let lapic_phys = madt.local_apic_address();
                let lapic_virt = mapper.map_system_memory(map, lapic_phys, 1, flags)?;
                let ioapic_virt = mapper.map_system_memory(map, io_apic.address(), 1, flags)?;

                if madt.has_legacy_pics() {
                    unsafe { DualPic::mask_all() };
                }
                let chip = unsafe {
                    ApicChip::new(
                        LocalApic::new(lapic_virt),
                        IoApicRegs::new(ioapic_virt),
                        io_apic.global_system_interrupt_base(),
                    )
                };
                info!(
                    "interrupt controller: APIC, lapic at {:p}, ioapic at {:p}",
                    lapic_phys,
                    io_apic.address()
                );
                return Ok(InterruptSystem::new(
                    SystemController::Apic(chip),
                    LegacyRemap::from_madt(madt),
                ));
            }
            warn!("MADT lists no IOAPIC, falling back to the legacy PIC");
        } else if madt.is_none() {
            warn!("no MADT found, falling back to the legacy PIC");
        }

        let pic = unsafe { DualPic::new(IRQ_BASE) };
        info!("interrupt controller: legacy dual 8259 PIC");
        Ok(InterruptSystem::new(
            SystemController::Pic(pic),
            LegacyRemap::identity(),
        ))
    }
}
