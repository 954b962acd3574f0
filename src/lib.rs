//! Imperium kernel core: the physical page allocator and the preemptive
//! round-robin process scheduler.
//!
//! Boot order is [`services::memory_service::pmm_initialize`], then
//! [`services::process_service::scheduler_initialize`]; after that the timer
//! handler drives [`interrupts::timer_interrupt`] on every tick.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod fatal;
pub mod interrupts;
pub mod logger;
pub mod memory;
pub mod process;
pub mod services;
pub mod time;

pub use config::SchedulerConfig;
pub use memory::PhysicalMemoryManager;
pub use process::{CpuRegisters, Pid, ProcessError, ProcessInfo, ProcessState, Scheduler};
pub use services::{memory_service, process_service, teardown};
