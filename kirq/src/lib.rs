//! Interrupt and exception dispatch.
//!
//! The dispatch policy lives in [`system::InterruptSystem`] and is fully
//! host-testable; the PIC and APIC backends behind the
//! [`controller::IrqController`] trait are the only hardware-touching
//! parts.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate static_assertions;

pub mod apic;
pub mod controller;
pub mod frame;
pub mod remap;
pub mod system;
pub mod table;
pub mod vectors;

#[cfg(target_arch = "x86_64")]
pub mod pic;

pub use self::controller::IrqController;
pub use self::frame::TrapFrame;
pub use self::remap::LegacyRemap;
pub use self::system::{request_reschedule, Dispatch, InterruptSystem};
pub use self::table::{Handler, VectorTable};
