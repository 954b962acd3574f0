// Process Management Service for Imperium
//
// Free-function entry points over the process-wide scheduler. Everything
// that switches processes takes the saved register frame of the caller and
// returns the frame the interrupt return path must restore.
use alloc::vec::Vec;
use x86_64::VirtAddr;

use super::with_core;
use crate::config::SchedulerConfig;
use crate::kassert;
use crate::process::{
    CpuRegisters, FdTable, FileTable, Pid, ProcessError, ProcessInfo, ProcessKind, Scheduler,
    SchedulerStats,
};
use crate::time::{TickSource, Uptime, SYSTEM_TIMER};

/// Create the process table with the idle process as its only entry.
/// Requires an initialized page allocator.
pub fn scheduler_initialize(config: SchedulerConfig) {
    with_core(|core| {
        kassert!(
            core.pmm.is_initialized(),
            "scheduler: initialized before the page allocator"
        );
        kassert!(core.scheduler.is_none(), "scheduler: initialized twice");
        core.scheduler = Some(Scheduler::new(config));
    })
}

/// Create a kernel thread at `entry` and make it ready to run.
pub fn process_create(entry: VirtAddr) -> Result<Pid, ProcessError> {
    with_core(|core| {
        let (scheduler, pmm) = core.scheduler_parts();
        scheduler.spawn(entry, pmm)
    })
}

pub fn process_create_named(
    entry: VirtAddr,
    kind: ProcessKind,
    name: &str,
) -> Result<Pid, ProcessError> {
    with_core(|core| {
        let (scheduler, pmm) = core.scheduler_parts();
        scheduler.create(entry, kind, name, pmm)
    })
}

/// Terminate the calling process. The returned frame belongs to whichever
/// process runs next; the caller never resumes.
pub fn process_exit(code: i32, saved: &CpuRegisters) -> CpuRegisters {
    with_core(|core| {
        let now = SYSTEM_TIMER.now();
        core.scheduler_parts().0.exit(code, saved, now)
    })
}

/// Put the calling process to sleep for at least `ms` milliseconds.
pub fn process_sleep(ms: u64, saved: &CpuRegisters) -> CpuRegisters {
    with_core(|core| {
        let now = SYSTEM_TIMER.now();
        core.scheduler_parts().0.sleep(ms, saved, now)
    })
}

/// Save `saved` into the current process and return the next one's frame.
pub fn dispatch(saved: &CpuRegisters) -> CpuRegisters {
    with_core(|core| {
        let now = SYSTEM_TIMER.now();
        core.scheduler_parts().0.dispatch(saved, now)
    })
}

/// Release a zombie's stacks, descriptors and table slot.
pub fn process_reap(pid: Pid, files: &mut dyn FileTable) -> Result<ProcessInfo, ProcessError> {
    with_core(|core| {
        let (scheduler, pmm) = core.scheduler_parts();
        scheduler.reap(pid, pmm, files)
    })
}

pub fn current_pid() -> Pid {
    with_core(|core| core.scheduler_parts().0.current_pid())
}

pub fn process_info(pid: Pid) -> Option<ProcessInfo> {
    with_core(|core| core.scheduler_parts().0.lookup(pid))
}

pub fn list_processes() -> Vec<ProcessInfo> {
    with_core(|core| core.scheduler_parts().0.processes())
}

/// Run `f` on the descriptor table of `pid`, if it exists.
pub fn with_open_files<F, R>(pid: Pid, f: F) -> Option<R>
where
    F: FnOnce(&mut FdTable) -> R,
{
    with_core(|core| core.scheduler_parts().0.open_files_mut(pid).map(f))
}

pub fn scheduler_stats() -> SchedulerStats {
    with_core(|core| core.scheduler_parts().0.stats())
}

/// Time since boot, at the configured tick rate.
pub fn uptime() -> Uptime {
    let hz = with_core(|core| {
        core.scheduler()
            .map_or_else(|| SchedulerConfig::default().tick_hz(), |s| s.config().tick_hz())
    });
    Uptime::from_ticks(SYSTEM_TIMER.now(), hz)
}
