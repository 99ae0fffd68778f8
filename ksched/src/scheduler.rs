//! The cooperative FIFO scheduler.

use kbase::KernelError;

use crate::context::ContextOps;
use crate::task::{BlockSource, Task, TaskHandle, TaskState};

/// Upper bound on tasks waiting in the ready queue.
pub const MAX_TASKS: usize = 64;

/// FIFO ring of tasks eligible to run.
struct ReadyQueue {
    slots: [Option<TaskHandle>; MAX_TASKS],
    head: usize,
    len: usize,
}

impl ReadyQueue {
    const fn new() -> ReadyQueue {
        ReadyQueue {
            slots: [None; MAX_TASKS],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, task: TaskHandle) -> Result<(), KernelError> {
        if self.len == MAX_TASKS {
            return Err(KernelError::OutOfMemory);
        }
        self.slots[(self.head + self.len) % MAX_TASKS] = Some(task);
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<TaskHandle> {
        if self.len == 0 {
            return None;
        }
        let task = self.slots[self.head].take();
        self.head = (self.head + 1) % MAX_TASKS;
        self.len -= 1;
        task
    }

    fn contains(&self, task: TaskHandle) -> bool {
        (0..self.len).any(|i| self.slots[(self.head + i) % MAX_TASKS] == Some(task))
    }
}

/// A pending transfer of control, produced by [`Scheduler::prepare_yield`].
///
/// Splitting preparation from the actual switch lets the caller drop any
/// lock guarding the scheduler before control leaves the current stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Switch {
    pub from: TaskHandle,
    pub to: TaskHandle,
}

pub struct Scheduler {
    current: Option<TaskHandle>,
    ready: ReadyQueue,
    /// Exited tasks pulled out of the ready queue, awaiting block reclaim.
    reapable: [Option<TaskHandle>; MAX_TASKS],
    reapable_len: usize,
}

impl Scheduler {
    pub const fn new() -> Scheduler {
        Scheduler {
            current: None,
            ready: ReadyQueue::new(),
            reapable: [None; MAX_TASKS],
            reapable_len: 0,
        }
    }

    /// The task currently owning the CPU.
    pub fn current(&self) -> Option<TaskHandle> {
        self.current
    }

    /// State half of [`Scheduler::initialize`]: record `task` as the first
    /// current task without transferring control. Lets a caller holding a
    /// lock on the scheduler release it before the one-way jump.
    pub fn prepare_bootstrap(&mut self, task: TaskHandle) -> Result<(), KernelError> {
        if self.current.is_some() {
            return Err(KernelError::Conflict);
        }
        if task.state() != TaskState::Init {
            return Err(KernelError::InvalidArgument);
        }
        info!("scheduler bootstrapping into task {}", task.id());
        task.set_state(TaskState::Running);
        self.current = Some(task);
        Ok(())
    }

    /// Hand the CPU to the very first task. Must be called exactly once;
    /// with the hardware context backend this never returns.
    pub fn initialize<O: ContextOps>(
        &mut self,
        ops: &O,
        task: TaskHandle,
    ) -> Result<(), KernelError> {
        self.prepare_bootstrap(task)?;
        unsafe { ops.jump(task) };
        Ok(())
    }

    /// Append a task to the tail of the ready queue.
    pub fn add_task(&mut self, task: TaskHandle) -> Result<(), KernelError> {
        if self.current == Some(task) || self.ready.contains(task) {
            return Err(KernelError::Conflict);
        }
        self.ready.push(task)
    }

    /// Rotate the queue: the current task goes to the tail, the head
    /// becomes current. Returns the transfer the caller must perform, or
    /// `None` when no other task is ready and the current task simply
    /// keeps running.
    ///
    /// Exited tasks encountered at the head are pulled aside for
    /// [`Scheduler::reap_exited`] instead of being resumed.
    pub fn prepare_yield(&mut self) -> Option<Switch> {
        let current = self.current?;
        let next = loop {
            let candidate = self.ready.pop()?;
            if candidate.state() == TaskState::Exited {
                if self.reapable_len == MAX_TASKS {
                    error!("reap list full, leaking task {}", candidate.id());
                } else {
                    debug!("parking exited task {} for reclaim", candidate.id());
                    self.reapable[self.reapable_len] = Some(candidate);
                    self.reapable_len += 1;
                }
                continue;
            }
            break candidate;
        };

        if current.state() == TaskState::Running {
            current.set_state(TaskState::Ready);
        }
        // cannot fail, one slot was just popped
        let _ = self.ready.push(current);

        next.set_state(TaskState::Running);
        self.current = Some(next);
        Some(Switch {
            from: current,
            to: next,
        })
    }

    /// Yield the CPU. Returns immediately when the ready queue is empty;
    /// otherwise returns only once this task is scheduled again.
    pub fn yield_now<O: ContextOps>(&mut self, ops: &O) {
        if let Some(switch) = self.prepare_yield() {
            unsafe { ops.switch(switch.from, switch.to) };
        }
    }

    /// Free the blocks of all tasks reaped during previous picks. Returns
    /// how many were reclaimed.
    pub fn reap_exited<S: BlockSource>(&mut self, source: &mut S) -> Result<usize, KernelError> {
        let count = self.reapable_len;
        for slot in self.reapable[..self.reapable_len].iter_mut() {
            if let Some(task) = slot.take() {
                Task::destroy(source, task)?;
            }
        }
        self.reapable_len = 0;
        Ok(count)
    }
}
