// Process-wide kernel core and its entry points
//
// The allocator and the scheduler live in one `KernelCore` behind a single
// lock. Entry points take the lock with interrupts masked, so a timer tick
// can never observe a half-updated bitmap or ready queue.
use lazy_static::lazy_static;
use spin::Mutex;

use crate::interrupts::without_interrupts;
use crate::kfatal;
use crate::memory::PhysicalMemoryManager;
use crate::process::Scheduler;

pub mod memory_service;
pub mod process_service;

/// Allocator plus scheduler. The scheduler exists only once
/// [`process_service::scheduler_initialize`] has run.
pub struct KernelCore {
    pmm: PhysicalMemoryManager,
    scheduler: Option<Scheduler>,
}

impl Default for KernelCore {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelCore {
    pub fn new() -> Self {
        Self {
            pmm: PhysicalMemoryManager::new(),
            scheduler: None,
        }
    }

    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// Scheduler together with the allocator it draws stacks from.
    #[track_caller]
    pub fn scheduler_parts(&mut self) -> (&mut Scheduler, &mut PhysicalMemoryManager) {
        match self.scheduler.as_mut() {
            Some(scheduler) => (scheduler, &mut self.pmm),
            None => kfatal!("scheduler: used before initialization"),
        }
    }
}

lazy_static! {
    pub static ref KERNEL_CORE: Mutex<KernelCore> = Mutex::new(KernelCore::new());
}

/// Run `f` against the kernel core with interrupts masked.
pub fn with_core<F, R>(f: F) -> R
where
    F: FnOnce(&mut KernelCore) -> R,
{
    without_interrupts(|| {
        let mut core = KERNEL_CORE.lock();
        f(&mut core)
    })
}

/// Drop every process and every page bookkeeping entry, returning the core
/// to its boot state.
pub fn teardown() {
    with_core(|core| *core = KernelCore::new());
    log::info!(target: "core", "kernel core torn down.");
}
