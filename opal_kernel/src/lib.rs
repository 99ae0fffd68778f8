//! The kernel proper: startup sequencing, interrupt entry and the glue
//! binding the subsystem crates together.
//!
//! The bare-metal image build links this crate and hands control to
//! [`kernel_main`], which is called exactly once with interrupts disabled.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate static_assertions;

pub mod bootinfo;
pub mod layout;

#[cfg(target_arch = "x86_64")]
pub mod arch;
#[cfg(target_arch = "x86_64")]
pub mod globals;
#[cfg(target_arch = "x86_64")]
pub mod kernel;
#[cfg(target_arch = "x86_64")]
pub mod logging;

/// Kernel entry point, called by the boot loader.
#[cfg(target_arch = "x86_64")]
#[no_mangle]
pub extern "C" fn kernel_main(info: &bootinfo::BootInfo) -> ! {
    kernel::main(info)
}
