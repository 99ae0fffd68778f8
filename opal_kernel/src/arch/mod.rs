//! x86_64 specific pieces: descriptor tables, interrupt entry stubs and
//! page table manipulation.

pub mod idt;
pub mod paging;
pub mod stubs;
