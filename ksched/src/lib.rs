//! Cooperative multitasking: tasks, the FIFO scheduler and the context
//! switch primitive.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate static_assertions;

pub mod context;
pub mod scheduler;
pub mod task;

pub use self::context::{ContextOps, SavedContext};
pub use self::scheduler::{Scheduler, Switch, MAX_TASKS};
pub use self::task::{
    set_exit_hook, BlockSource, Task, TaskEntry, TaskHandle, TaskId, TaskState, TASK_PAGES,
};

#[cfg(target_arch = "x86_64")]
pub use self::context::HwContext;
