//! Kernel state that must be reachable from interrupt context.
//!
//! Everything here sits behind a spin lock. The locks are never held
//! across a context switch; the split preparation APIs of the scheduler
//! exist exactly so the guards can be dropped first.

use kbase::cpu::io::{SerialPort, COM1_ADDR};
use kirq::system::SystemController;
use kirq::InterruptSystem;
use kmm::MemoryMap;
use ksched::Scheduler;
use spinlock::Mutex;

/// The diagnostics serial port. The panic handler bypasses this lock with
/// a fresh handle, everything else goes through it.
pub static COM1: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1_ADDR) });

/// The single source of truth about physical memory.
pub static MEMORY_MAP: Mutex<MemoryMap> = Mutex::new(MemoryMap::new());

pub static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

/// The interrupt dispatcher, present once the controller is initialized.
pub static INTERRUPTS: Mutex<Option<InterruptSystem<SystemController>>> = Mutex::new(None);
