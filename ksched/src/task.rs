//! The task: one kernel-mode execution context and the fixed-size block
//! holding it together with its stack.

use kbase::{KernelError, VirtAddr, PAGE_SIZE};

use crate::context::{ContextOps, SavedContext};

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Pages per task block: the `Task` header sits at the low end, the stack
/// grows down from the high end.
pub const TASK_PAGES: usize = 2;

/// Bytes of one task block.
pub const TASK_BLOCK_SIZE: usize = TASK_PAGES * PAGE_SIZE;

/// Process-wide monotonically increasing task id. Never reused.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> TaskId {
    TaskId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum TaskState {
    /// Context prepared, never run.
    Init,
    /// Context valid, waiting in the ready queue.
    Ready,
    /// Currently executing.
    Running,
    /// Entry point returned; the block is reclaimed at the scheduler's
    /// next pick.
    Exited,
}

/// The task's entry point, invoked by the trampoline on first resumption.
pub type TaskEntry = fn(task: TaskHandle, arg: usize);

/// Where task blocks come from. The kernel backs this with the physical
/// allocator; tests back it with the host heap.
pub trait BlockSource {
    fn allocate_block(&mut self, pages: usize) -> Result<VirtAddr, KernelError>;
    fn free_block(&mut self, addr: VirtAddr, pages: usize) -> Result<(), KernelError>;
}

/// One kernel-mode execution context. Lives at the bottom of its own
/// block, never moves, never copied.
pub struct Task {
    id: TaskId,
    state: TaskState,
    /// Top of the saved register frame on this task's stack. Only valid
    /// while the task is not running.
    context: *mut SavedContext,
    /// Highest address of the block, where the stack starts growing down.
    stack_top: VirtAddr,
    entry: TaskEntry,
    arg: usize,
    block: VirtAddr,
}

impl Task {
    /// Allocate a block and construct a task inside it, laying down the
    /// initial saved context so the first switch lands in the trampoline.
    ///
    /// Fails without partial effects when no block can be allocated.
    pub fn create<S, O>(
        source: &mut S,
        ops: &O,
        entry: TaskEntry,
        arg: usize,
    ) -> Result<TaskHandle, KernelError>
    where
        S: BlockSource,
        O: ContextOps,
    {
        let block = source.allocate_block(TASK_PAGES)?;
        let task_ptr = block.as_mut_ptr::<Task>();
        let task = Task {
            id: next_id(),
            state: TaskState::Init,
            context: core::ptr::null_mut(),
            stack_top: block + TASK_BLOCK_SIZE,
            entry,
            arg,
            block,
        };
        unsafe {
            task_ptr.write(task);
            let handle = TaskHandle(NonNull::new_unchecked(task_ptr));
            ops.prepare(handle);
            debug!("created task {} in block at {:p}", handle.id(), block);
            Ok(handle)
        }
    }

    /// Free a task's block. The caller must guarantee that the task can
    /// never be resumed again.
    pub fn destroy<S: BlockSource>(source: &mut S, task: TaskHandle) -> Result<(), KernelError> {
        let block = unsafe { task.0.as_ref().block };
        source.free_block(block, TASK_PAGES)
    }
}

/// Shared reference to a task. Tasks are pointed to from the current-task
/// slot and the ready queue at the same time; the single-CPU cooperative
/// model is what makes the aliasing sound.
#[derive(Copy, Clone, Debug)]
pub struct TaskHandle(NonNull<Task>);

impl PartialEq for TaskHandle {
    fn eq(&self, other: &TaskHandle) -> bool {
        self.0 == other.0
    }
}

impl Eq for TaskHandle {}

unsafe impl Send for TaskHandle {}

impl TaskHandle {
    /// # Safety
    ///
    /// `task` must point at a live, block-backed `Task`.
    pub(crate) unsafe fn from_raw(task: *mut Task) -> TaskHandle {
        TaskHandle(NonNull::new_unchecked(task))
    }

    pub fn id(&self) -> TaskId {
        unsafe { self.0.as_ref().id }
    }

    pub fn state(&self) -> TaskState {
        unsafe { self.0.as_ref().state }
    }

    pub fn stack_top(&self) -> VirtAddr {
        unsafe { self.0.as_ref().stack_top }
    }

    pub fn as_ptr(&self) -> *mut Task {
        self.0.as_ptr()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        unsafe { (*self.0.as_ptr()).state = state }
    }

    /// Slot where the switch routine stores the outgoing task's context
    /// pointer.
    pub(crate) fn context_slot(&self) -> *mut *mut SavedContext {
        unsafe { &mut (*self.0.as_ptr()).context }
    }

    pub(crate) fn context(&self) -> *mut SavedContext {
        unsafe { self.0.as_ref().context }
    }

    pub(crate) fn set_context(&self, context: *mut SavedContext) {
        unsafe { (*self.0.as_ptr()).context = context }
    }
}

/// Called by an exited task to give up the CPU until it is reaped. The
/// kernel installs the scheduler's yield here during startup.
static EXIT_HOOK: AtomicUsize = AtomicUsize::new(0);

pub fn set_exit_hook(hook: fn()) {
    EXIT_HOOK.store(hook as usize, Ordering::Release);
}

/// Landing point of a task's first resumption. Transitions the state,
/// runs the entry point and parks the task once it returns.
pub(crate) extern "C" fn task_main(task: *mut Task) -> ! {
    let handle = unsafe { TaskHandle::from_raw(task) };
    handle.set_state(TaskState::Running);
    let (entry, arg) = unsafe { ((*task).entry, (*task).arg) };
    entry(handle, arg);

    info!("task {} exited", handle.id());
    handle.set_state(TaskState::Exited);
    loop {
        let hook = EXIT_HOOK.load(Ordering::Acquire);
        if hook != 0 {
            let hook: fn() = unsafe { core::mem::transmute(hook) };
            hook();
        } else {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test_support::{HeapBlocks, NoContext};

    fn entry(_task: TaskHandle, _arg: usize) {}

    #[test]
    fn create_initializes_header_and_ids_grow() {
        let mut source = HeapBlocks::new();

        let a = Task::create(&mut source, &NoContext, entry, 7).unwrap();
        let b = Task::create(&mut source, &NoContext, entry, 8).unwrap();

        assert_eq!(a.state(), TaskState::Init);
        assert!(b.id() > a.id(), "ids must be monotonic");
        assert_eq!(a.stack_top(), VirtAddr(a.as_ptr() as usize + TASK_BLOCK_SIZE));

        Task::destroy(&mut source, a).unwrap();
        Task::destroy(&mut source, b).unwrap();
        assert_eq!(source.outstanding(), 0);
    }

    #[test]
    fn create_propagates_allocation_failure() {
        struct Broke;
        impl BlockSource for Broke {
            fn allocate_block(&mut self, _pages: usize) -> Result<VirtAddr, KernelError> {
                Err(KernelError::OutOfMemory)
            }
            fn free_block(&mut self, _addr: VirtAddr, _pages: usize) -> Result<(), KernelError> {
                Ok(())
            }
        }

        assert_eq!(
            Task::create(&mut Broke, &NoContext, entry, 0).map(|_| ()),
            Err(KernelError::OutOfMemory)
        );
    }
}
