//! Kernel startup and the glue between the subsystem crates.

use crate::arch::paging::OffsetMapper;
use crate::arch::{idt, stubs};
use crate::{bootinfo, globals, layout, logging};

use kacpi::{AcpiTable, AcpiTables, Madt, Rsdt, Xsdt};
use kbase::{cpu, KernelError, PhysAddr, VirtAddr};
use kirq::{Dispatch, TrapFrame};
use kmm::RegionKind;
use ksched::{BlockSource, ContextOps, HwContext, Task, TaskHandle};

/// A startup step failed; without it the machine cannot do useful work.
fn fatal(context: &str, err: KernelError) -> ! {
    error!("{}: {}", context, err);
    unsafe {
        cpu::disable_interrupts();
        cpu::hang()
    }
}

pub fn main(info: &bootinfo::BootInfo) -> ! {
    logging::init();
    info!("opal kernel starting");

    {
        let mut map = globals::MEMORY_MAP.lock();
        if let Err(err) = unsafe { bootinfo::build_memory_map(info, &mut map) } {
            fatal("cannot build the physical memory map", err);
        }
        if let Err(err) = map.reclaim_boot_regions() {
            fatal("cannot reclaim boot loader memory", err);
        }
        info!(
            "{} memory regions, {} pages available",
            map.len(),
            map.available_pages()
        );
    }

    unsafe { idt::init(&stubs::VECTOR_STUBS) };

    let mut mapper = unsafe { OffsetMapper::current() };

    let mut tables = AcpiTables::new();
    register_firmware_tables(info, &mut tables);
    let madt = tables.find_table::<Madt>(0);

    let system = {
        let mut map = globals::MEMORY_MAP.lock();
        match kirq::system::initialize(madt, cpu::has_apic(), &mut map, &mut mapper) {
            Ok(system) => system,
            Err(err) => fatal("cannot initialize the interrupt controller", err),
        }
    };
    *globals::INTERRUPTS.lock() = Some(system);

    ksched::set_exit_hook(yield_now);

    let bootstrap = match Task::create(&mut KernelBlocks, &HwContext, idle_main, 0) {
        Ok(task) => task,
        Err(err) => fatal("cannot create the bootstrap task", err),
    };
    if let Err(err) = globals::SCHEDULER.lock().prepare_bootstrap(bootstrap) {
        fatal("cannot bootstrap the scheduler", err);
    }
    info!("handing over to task {}", bootstrap.id());
    unsafe {
        cpu::enable_interrupts();
        HwContext.jump(bootstrap);
        // the jump abandons this stack
        cpu::hang()
    }
}

/// Register every table listed by the firmware's root table. The tables
/// live in ACPI-reclaimable RAM, which the direct mapping already covers.
fn register_firmware_tables(info: &bootinfo::BootInfo, tables: &mut AcpiTables) {
    let (root, wide) = if info.xsdt != 0 {
        (PhysAddr(info.xsdt as usize), true)
    } else if info.rsdt != 0 {
        (PhysAddr(info.rsdt as usize), false)
    } else {
        warn!("boot loader provided no ACPI root table");
        return;
    };

    let root_sdt = match unsafe { kacpi::table_from_raw(layout::phys_to_virt(root)) } {
        Some(sdt) => sdt,
        None => {
            warn!("ACPI root table at {:p} has a bad checksum", root);
            return;
        }
    };

    if wide {
        if let Some(xsdt) = Xsdt::from_any(root_sdt) {
            for phys in xsdt.entries() {
                let _ = unsafe { tables.register(layout::phys_to_virt(phys)) };
            }
        }
    } else if let Some(rsdt) = Rsdt::from_any(root_sdt) {
        for phys in rsdt.entries() {
            let _ = unsafe { tables.register(layout::phys_to_virt(phys)) };
        }
    }
    info!("{} ACPI tables registered", tables.len());
}

/// Task blocks come straight from the physical allocator; the direct
/// mapping makes them addressable without a separate mapping step.
struct KernelBlocks;

impl BlockSource for KernelBlocks {
    fn allocate_block(&mut self, pages: usize) -> Result<VirtAddr, KernelError> {
        let phys = globals::MEMORY_MAP
            .lock()
            .allocate_frames(RegionKind::KernelData, pages)?;
        Ok(layout::phys_to_virt(phys))
    }

    fn free_block(&mut self, addr: VirtAddr, pages: usize) -> Result<(), KernelError> {
        let phys = layout::virt_to_phys(addr).ok_or(KernelError::InvalidArgument)?;
        globals::MEMORY_MAP.lock().free_frames(phys, pages)
    }
}

/// Give up the CPU until the scheduler comes back around. Also installed
/// as the exit hook, so finished tasks keep yielding until reaped.
pub fn yield_now() {
    let switch = globals::SCHEDULER.lock().prepare_yield();
    if let Some(switch) = switch {
        unsafe { HwContext.switch(switch.from, switch.to) };
    }
    reap();
}

fn reap() {
    let mut scheduler = globals::SCHEDULER.lock();
    match scheduler.reap_exited(&mut KernelBlocks) {
        Ok(0) => {}
        Ok(count) => debug!("reclaimed {} task blocks", count),
        Err(err) => warn!("task block reclaim failed: {}", err),
    }
}

/// Called by the common entry stub with a complete trap frame on the
/// stack. Interrupts are disabled for the whole dispatch.
pub extern "C" fn interrupt_entry(frame: &mut TrapFrame) {
    let outcome = {
        let mut interrupts = globals::INTERRUPTS.lock();
        match interrupts.as_mut() {
            Some(system) => system.dispatch(frame),
            None => {
                error!("interrupt {:#04x} before the dispatcher is up", frame.vector);
                return;
            }
        }
    };
    match outcome {
        Dispatch::Fatal => unsafe {
            cpu::disable_interrupts();
            cpu::hang();
        },
        // the dispatch lock is already released here; the switch restores
        // the incoming task's RFLAGS, so it does not inherit the masked
        // interrupt flag of this entry path, and the interrupted task
        // finishes the iretq once it gets scheduled again
        Dispatch::Reschedule => yield_now(),
        _ => {}
    }
}

/// The bootstrap task: spawns the initial workload, then keeps the
/// scheduler turning.
fn idle_main(_task: TaskHandle, _arg: usize) {
    spawn_demo_tasks();
    loop {
        yield_now();
    }
}

fn worker_main(task: TaskHandle, rounds: usize) {
    for round in 0..rounds {
        info!("task {} running round {}", task.id(), round);
        yield_now();
    }
}

fn spawn_demo_tasks() {
    for rounds in [3, 5] {
        match Task::create(&mut KernelBlocks, &HwContext, worker_main, rounds) {
            Ok(task) => {
                if let Err(err) = globals::SCHEDULER.lock().add_task(task) {
                    warn!("cannot enqueue task {}: {}", task.id(), err);
                }
            }
            Err(err) => warn!("cannot create worker task: {}", err),
        }
    }
}

/// Last resort output path. The shared console lock may be held by the
/// panicking context, so this grabs a fresh handle to the port.
#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use core::fmt::Write;
    use kbase::cpu::io::{SerialPort, COM1_ADDR};

    unsafe {
        cpu::disable_interrupts();
        let mut console = SerialPort::new(COM1_ADDR);
        let _ = writeln!(console, "kernel panic: {}", info);
        cpu::hang()
    }
}
