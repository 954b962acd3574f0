// Interrupt-side boundary of the scheduler
//
// The timer handler and the voluntary yield path hand the saved register
// frame in and restore whatever frame comes back. Every mutation of the
// allocator or the scheduler happens with interrupts masked.
use crate::process::CpuRegisters;
use crate::{services, time};

/// Run `f` with maskable interrupts disabled, restoring the previous state
/// afterwards.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    x86_64::instructions::interrupts::without_interrupts(f)
}

/// Hosted builds have no interrupt flag to mask; the caller is the only
/// thread driving the core.
#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

/// Timer tick: advance the system clock, then pick the next process.
pub fn timer_interrupt(saved: &CpuRegisters) -> CpuRegisters {
    time::tick();
    services::process_service::dispatch(saved)
}

/// Give up the rest of the quantum without advancing the clock.
pub fn yield_now(saved: &CpuRegisters) -> CpuRegisters {
    services::process_service::dispatch(saved)
}
