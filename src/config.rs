// Kernel core configuration for Imperium
use crate::kassert;

/// Size of one physical page frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// Fixed capacity of the process table, idle process included.
pub const MAX_PROCESSES: usize = 64;

/// Open-file slots carried by every PCB.
pub const MAX_FILE_DESCRIPTORS: usize = 256;

/// Time slice granted to a process between two timer ticks (in milliseconds).
pub const SCHEDULER_QUANTUM_MS: u64 = 20;

pub const KERNEL_STACK_PAGES: usize = 1;
pub const USER_STACK_PAGES: usize = 1;

/// Lines retained by the in-memory kernel log.
pub const KLOG_CAPACITY: usize = 128;

/// Runtime scheduler parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_processes: usize,
    pub quantum_ms: u64,
    pub kernel_stack_pages: usize,
    pub user_stack_pages: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_processes: MAX_PROCESSES,
            quantum_ms: SCHEDULER_QUANTUM_MS,
            kernel_stack_pages: KERNEL_STACK_PAGES,
            user_stack_pages: USER_STACK_PAGES,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with a different table capacity, everything else default.
    pub fn with_capacity(max_processes: usize) -> Self {
        Self {
            max_processes,
            ..Self::default()
        }
    }

    /// Timer frequency implied by the quantum: one tick per quantum.
    pub fn tick_hz(&self) -> u64 {
        1000 / self.quantum_ms
    }

    /// Convert a duration to a tick delta, rounding up so a sleeper never
    /// wakes before `ms` has elapsed.
    pub fn ms_to_ticks(&self, ms: u64) -> u64 {
        let hz = self.tick_hz();
        ms.saturating_mul(hz).saturating_add(999) / 1000
    }

    /// Halts on a configuration no scheduler could run with.
    pub fn validate(&self) {
        kassert!(self.max_processes > 0, "scheduler config: process table capacity is zero");
        kassert!(
            self.quantum_ms > 0 && 1000 % self.quantum_ms == 0,
            "scheduler config: quantum must divide one second evenly"
        );
        kassert!(
            self.kernel_stack_pages > 0,
            "scheduler config: processes need at least one kernel stack page"
        );
    }
}
