// System tick counter
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Monotonic tick counter read by the scheduler.
pub trait TickSource: Sync {
    fn now(&self) -> u64;
}

/// Tick counter advanced by the timer interrupt handler.
pub struct SystemTimer {
    ticks: AtomicU64,
}

impl SystemTimer {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// Advance by one tick and return the new count.
    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl Default for SystemTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for SystemTimer {
    fn now(&self) -> u64 {
        self.ticks()
    }
}

pub static SYSTEM_TIMER: SystemTimer = SystemTimer::new();

/// Called from the timer interrupt.
pub fn tick() -> u64 {
    SYSTEM_TIMER.tick()
}

pub fn ticks() -> u64 {
    SYSTEM_TIMER.ticks()
}

/// Tick count broken down for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uptime {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub ticks: u64,
}

impl Uptime {
    pub fn from_ticks(ticks: u64, hz: u64) -> Self {
        let total_seconds = if hz == 0 { 0 } else { ticks / hz };
        let total_minutes = total_seconds / 60;
        let total_hours = total_minutes / 60;
        Self {
            days: total_hours / 24,
            hours: total_hours % 24,
            minutes: total_minutes % 60,
            seconds: total_seconds % 60,
            ticks,
        }
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "system up for: {} days, {} hours, {} minutes, {} seconds ({} ticks)",
            self.days, self.hours, self.minutes, self.seconds, self.ticks
        )
    }
}
