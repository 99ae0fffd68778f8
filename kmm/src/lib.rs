//! Physical memory map, frame allocator and paging primitives.
//!
//! The [`map::MemoryMap`] is the single source of truth about physical
//! memory: every frame the kernel hands out is recorded here. Virtual
//! mappings are performed through the [`mapper::MemoryMapper`] collaborator
//! so the bookkeeping in this crate stays testable on the host.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate log;

#[macro_use]
extern crate static_assertions;

pub mod map;
pub mod mapper;
pub mod paging;

pub use self::map::{MemoryAttributes, MemoryDescriptor, MemoryMap, PageFrame, RegionKind};
pub use self::mapper::MemoryMapper;
pub use self::paging::{PageFlags, PageTableEntry};
