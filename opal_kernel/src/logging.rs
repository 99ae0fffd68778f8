//! Routes the `log` macros of all kernel crates to the serial port.

use crate::globals;

use kbase::cpu;
use log::{Level, LevelFilter, Log, Metadata, Record};

use core::fmt::Write;

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // the dispatcher logs from interrupt context; COM1 may only be held
        // with interrupts masked, or that log spins on its own task's guard
        let reenable = cpu::interrupts_enabled();
        unsafe { cpu::disable_interrupts() };
        {
            let mut com1 = globals::COM1.lock();
            let _ = writeln!(
                com1,
                "[{:<5}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
        if reenable {
            unsafe { cpu::enable_interrupts() };
        }
    }

    fn flush(&self) {}
}

/// Bring up the serial port and install the logger. Called once, first
/// thing in `kernel_main`.
pub fn init() {
    globals::COM1.lock().configure();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}
