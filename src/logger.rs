// Kernel logger for Imperium
//
// Backs the `log` facade. Every record is rendered as
// `[level] component: message`, kept in a bounded in-memory ring (`klog`)
// and echoed to the console sink, if one was given.
use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use conquer_once::spin::OnceCell;
use core::fmt;
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use crate::config::KLOG_CAPACITY;

/// Where rendered lines go besides the ring (VGA text buffer, serial port).
pub type ConsoleSink = fn(&str);

pub struct KernelLogger {
    level: LevelFilter,
    console: Option<ConsoleSink>,
    capacity: usize,
    ring: Mutex<VecDeque<String>>,
}

impl KernelLogger {
    pub fn new(level: LevelFilter, console: Option<ConsoleSink>) -> Self {
        Self::with_capacity(level, console, KLOG_CAPACITY)
    }

    pub fn with_capacity(level: LevelFilter, console: Option<ConsoleSink>, capacity: usize) -> Self {
        Self {
            level,
            console,
            capacity,
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.ring.lock().iter().cloned().collect()
    }

    fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut ring = self.ring.lock();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(line);
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record.level(), record.target(), record.args());
        if let Some(console) = self.console {
            console(&line);
        }
        self.push(line);
    }

    fn flush(&self) {}
}

/// `[info]  pmm: physical memory manager initialized.`
pub fn format_line(level: Level, component: &str, message: &fmt::Arguments<'_>) -> String {
    let tag = format!("[{}]", level.as_str().to_ascii_lowercase());
    format!("{:<8}{}: {}", tag, component, message)
}

static LOGGER: OnceCell<KernelLogger> = OnceCell::uninit();

/// Install the kernel logger behind the `log` facade. Returns `false` if a
/// logger was already installed.
pub fn init(level: LevelFilter, console: Option<ConsoleSink>) -> bool {
    if LOGGER
        .try_init_once(|| KernelLogger::new(level, console))
        .is_err()
    {
        return false;
    }
    let logger = match LOGGER.try_get() {
        Ok(logger) => logger,
        Err(_) => return false,
    };
    if log::set_logger(logger).is_err() {
        return false;
    }
    log::set_max_level(level);
    true
}

/// Snapshot of the kernel log ring, oldest first.
pub fn klog() -> Vec<String> {
    LOGGER.try_get().map(KernelLogger::lines).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn record(logger: &KernelLogger, level: Level, target: &str, args: fmt::Arguments<'_>) {
        logger.log(&Record::builder().level(level).target(target).args(args).build());
    }

    #[test]
    fn lines_keep_the_console_layout() {
        assert_eq!(
            format_line(Level::Info, "pmm", &format_args!("physical memory manager initialized.")),
            "[info]  pmm: physical memory manager initialized."
        );
        assert_eq!(
            format_line(Level::Debug, "pmm", &format_args!("allocated page.")),
            "[debug] pmm: allocated page."
        );
    }

    #[test]
    fn ring_drops_oldest_line() {
        let logger = KernelLogger::with_capacity(LevelFilter::Trace, None, 2);
        record(&logger, Level::Info, "core", format_args!("one"));
        record(&logger, Level::Info, "core", format_args!("two"));
        record(&logger, Level::Warn, "sched", format_args!("three"));
        assert_eq!(logger.lines(), vec!["[info]  core: two", "[warn]  sched: three"]);
    }

    #[test]
    fn records_above_level_are_dropped() {
        let logger = KernelLogger::with_capacity(LevelFilter::Info, None, 4);
        record(&logger, Level::Debug, "pmm", format_args!("noise"));
        record(&logger, Level::Error, "pmm", format_args!("boom"));
        assert_eq!(logger.lines(), vec!["[error] pmm: boom"]);
    }

    static CONSOLE_LINES: AtomicUsize = AtomicUsize::new(0);

    fn console(_line: &str) {
        CONSOLE_LINES.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn console_sink_sees_every_line() {
        let logger = KernelLogger::with_capacity(LevelFilter::Info, Some(console), 1);
        record(&logger, Level::Info, "core", format_args!("a"));
        record(&logger, Level::Info, "core", format_args!("b"));
        assert_eq!(CONSOLE_LINES.load(Ordering::SeqCst), 2);
        assert_eq!(logger.lines().len(), 1);
    }

    #[test]
    fn global_logger_feeds_klog() {
        assert!(init(LevelFilter::Info, None));
        assert!(!init(LevelFilter::Info, None));
        log::info!(target: "core", "coresystem initialization sequence started.");
        assert!(klog()
            .iter()
            .any(|line| line == "[info]  core: coresystem initialization sequence started."));
    }
}
